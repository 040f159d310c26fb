//! IPC authentication token
//!
//! The daemon generates a random token on startup and writes it to a file
//! readable only by the owner. Clients read the token and present it with
//! `Authenticate` before any request other than `Ping`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Length of the authentication token in bytes (before hex encoding)
const TOKEN_BYTES: usize = 32;

const TOKEN_FILENAME: &str = "ipc_auth_token";

/// Default location of the token file
pub fn default_token_path() -> PathBuf {
    crate::config::default_config_dir().join(TOKEN_FILENAME)
}

/// Generate a new random token, 64 hex characters
pub fn generate_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Write the token with mode 0600 on Unix
pub fn write_token(path: &Path, token: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, token)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    tracing::debug!("Wrote IPC token to {:?}", path);

    Ok(())
}

pub fn read_token(path: &Path) -> io::Result<String> {
    Ok(fs::read_to_string(path)?.trim().to_string())
}

/// Remove the token file, ignoring a missing file
pub fn remove_token(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Constant-time token comparison
pub fn validate_token(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        result |= a ^ b;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_token() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_validate_token() {
        assert!(validate_token("abc123", "abc123"));
        assert!(!validate_token("abc123", "abc124"));
        assert!(!validate_token("abc", "abc123"));
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sub").join(TOKEN_FILENAME);
        let token = generate_token();

        write_token(&path, &token).unwrap();
        assert_eq!(read_token(&path).unwrap(), token);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        remove_token(&path).unwrap();
        assert!(!path.exists());
        remove_token(&path).unwrap();
    }
}
