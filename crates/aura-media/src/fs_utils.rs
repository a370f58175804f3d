//! Moving staged uploads into job directories.
//!
//! The API stages uploads under the system temp dir while job directories
//! may live on a mounted volume, so a plain rename can fail with EXDEV.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// Move `src` to `dst`, creating `dst`'s parent and falling back to
/// copy-then-delete across filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let (src, dst) = (src.as_ref(), dst.as_ref());

    if !fs::try_exists(src).await? {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!(src = %src.display(), dst = %dst.display(), "Cross-device move, copying");
            copy_across(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

const EXDEV: i32 = 18;

async fn copy_across(src: &Path, dst: &Path) -> MediaResult<()> {
    // Land next to the destination first so the final step is a same-device rename.
    let partial = dst.with_extension("partial");

    fs::copy(src, &partial).await?;
    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(path = %src.display(), error = %e, "Staged file left behind after copy");
    }
    Ok(())
}
