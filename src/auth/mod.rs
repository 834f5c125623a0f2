//! Garmin Connect authentication from a pre-issued credential bundle.
//!
//! Sign-in itself happens elsewhere; this module only decodes the bundle,
//! renews an expired access token and produces request headers.

pub mod endpoints;
pub mod error;
pub mod oauth1;
pub mod session;
pub mod token;

use std::path::Path;

use anyhow::Context;

pub use self::endpoints::Endpoints;
pub use self::session::Session;

/// Write the session's (possibly refreshed) bundle so the next run can
/// start without a refresh. Owner-only permissions on Unix.
pub async fn save_secret(session: &Session, path: &Path) -> anyhow::Result<()> {
    let encoded = session.bundle().encode()?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, encoded)
        .await
        .with_context(|| format!("Failed to write secret to {}", path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(path, perms).await?;
    }
    tracing::debug!("Saved credential bundle to {}", path.display());
    Ok(())
}
