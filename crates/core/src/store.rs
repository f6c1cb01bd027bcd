//! Persistence of authenticated session state.
//!
//! A [`SessionStore`] answers one question at the start of a run: is there a
//! usable session? Absent, unreadable and malformed files all collapse into
//! `None`, so callers treat "no usable session" as a single case.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};
use tradeflow_protocol::StorageState;

use crate::error::{Error, Result};

/// Where a credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
	/// Read from a [`SessionStore`].
	Loaded,
	/// Exported from a context right after credential login.
	Captured,
}

/// Serialized authentication state plus when it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCredential {
	pub state: StorageState,
	/// Unix seconds of capture or load.
	pub timestamp: u64,
	pub source: CredentialSource,
}

impl SessionCredential {
	pub fn loaded(state: StorageState) -> Self {
		Self {
			state,
			timestamp: crate::unix_now(),
			source: CredentialSource::Loaded,
		}
	}

	pub fn captured(state: StorageState) -> Self {
		Self {
			state,
			timestamp: crate::unix_now(),
			source: CredentialSource::Captured,
		}
	}
}

/// Durable home of the session credential.
pub trait SessionStore: Send + Sync {
	/// Returns the stored credential, or `None` when nothing usable exists.
	fn load(&self) -> Option<SessionCredential>;

	/// Replaces the stored credential.
	fn save(&self, credential: &SessionCredential) -> Result<()>;
}

impl<S: SessionStore + ?Sized> SessionStore for Arc<S> {
	fn load(&self) -> Option<SessionCredential> {
		(**self).load()
	}

	fn save(&self, credential: &SessionCredential) -> Result<()> {
		(**self).save(credential)
	}
}

/// Stores the credential as a Playwright-compatible storage-state JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
	path: PathBuf,
}

impl FileSessionStore {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Like [`SessionStore::load`], but reports why a present file is unusable.
	pub fn try_load(&self) -> Result<Option<SessionCredential>> {
		let content = match fs::read_to_string(&self.path) {
			Ok(content) => content,
			Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
			Err(err) => return Err(self.corrupt(err.to_string())),
		};

		let state: StorageState = serde_json::from_str(&content).map_err(|e| self.corrupt(e.to_string()))?;
		if state.is_empty() {
			return Err(self.corrupt("storage state has no cookies or localStorage"));
		}

		Ok(Some(SessionCredential::loaded(state)))
	}

	/// Deletes the stored file. Returns whether anything was removed.
	pub fn clear(&self) -> Result<bool> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(true),
			Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
			Err(err) => Err(err.into()),
		}
	}

	fn corrupt(&self, reason: impl Into<String>) -> Error {
		Error::SessionStoreCorrupt {
			path: self.path.clone(),
			reason: reason.into(),
		}
	}
}

impl SessionStore for FileSessionStore {
	fn load(&self) -> Option<SessionCredential> {
		match self.try_load() {
			Ok(Some(credential)) => {
				debug!(target = "tradeflow", path = %self.path.display(), cookies = credential.state.cookies.len(), "loaded stored session");
				Some(credential)
			}
			Ok(None) => {
				debug!(target = "tradeflow", path = %self.path.display(), "no stored session");
				None
			}
			Err(err) => {
				warn!(target = "tradeflow", error = %err, "ignoring unusable stored session");
				None
			}
		}
	}

	fn save(&self, credential: &SessionCredential) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			if !parent.as_os_str().is_empty() {
				fs::create_dir_all(parent)?;
			}
		}

		// Write-then-rename so a crash never leaves a half-written session.
		let tmp = self.path.with_extension("json.tmp");
		fs::write(&tmp, credential.state.to_json_pretty()?)?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600))?;
		}
		fs::rename(&tmp, &self.path)?;

		debug!(
			target = "tradeflow",
			path = %self.path.display(),
			cookies = credential.state.cookies.len(),
			origins = credential.state.origins.len(),
			"saved session"
		);
		Ok(())
	}
}

/// In-process store, for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
	slot: Mutex<Option<SessionCredential>>,
	saves: Mutex<usize>,
}

impl MemorySessionStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_state(state: StorageState) -> Self {
		Self {
			slot: Mutex::new(Some(SessionCredential::loaded(state))),
			saves: Mutex::new(0),
		}
	}

	/// Number of [`SessionStore::save`] calls so far.
	pub fn save_count(&self) -> usize {
		*self.saves.lock()
	}

	pub fn current(&self) -> Option<SessionCredential> {
		self.slot.lock().clone()
	}
}

impl SessionStore for MemorySessionStore {
	fn load(&self) -> Option<SessionCredential> {
		self.slot.lock().clone().map(|c| SessionCredential::loaded(c.state))
	}

	fn save(&self, credential: &SessionCredential) -> Result<()> {
		*self.slot.lock() = Some(credential.clone());
		*self.saves.lock() += 1;
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use tempfile::TempDir;
	use tradeflow_protocol::Cookie;

	use super::*;

	fn sample_state() -> StorageState {
		StorageState::with_cookies(vec![Cookie::new("ASP.NET_SessionId", "token", ".stocktrak.com").path("/")])
	}

	#[test]
	fn missing_file_loads_as_none() {
		let tmp = TempDir::new().unwrap();
		let store = FileSessionStore::new(tmp.path().join("session.json"));
		assert!(store.load().is_none());
		assert!(store.try_load().unwrap().is_none());
	}

	#[test]
	fn corrupt_file_loads_as_none_but_reports_reason() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("session.json");
		fs::write(&path, "{ not json").unwrap();

		let store = FileSessionStore::new(&path);
		assert!(store.load().is_none());
		assert!(matches!(store.try_load(), Err(Error::SessionStoreCorrupt { .. })));
	}

	#[test]
	fn empty_state_is_not_a_session() {
		let tmp = TempDir::new().unwrap();
		let path = tmp.path().join("session.json");
		fs::write(&path, r#"{"cookies": [], "origins": []}"#).unwrap();

		let store = FileSessionStore::new(&path);
		assert!(store.load().is_none());
		let err = store.try_load().unwrap_err();
		assert!(err.to_string().contains("no cookies"));
	}

	#[test]
	fn save_then_load_restores_state() {
		let tmp = TempDir::new().unwrap();
		let store = FileSessionStore::new(tmp.path().join("nested/dir/session.json"));

		store.save(&SessionCredential::captured(sample_state())).unwrap();
		let loaded = store.load().unwrap();

		assert_eq!(loaded.state, sample_state());
		assert_eq!(loaded.source, CredentialSource::Loaded);
		assert!(!tmp.path().join("nested/dir/session.json.tmp").exists());
	}

	#[test]
	fn save_overwrites_previous_session() {
		let tmp = TempDir::new().unwrap();
		let store = FileSessionStore::new(tmp.path().join("session.json"));

		store.save(&SessionCredential::captured(sample_state())).unwrap();
		let newer = StorageState::with_cookies(vec![Cookie::new("fresh", "1", "www.stocktrak.com")]);
		store.save(&SessionCredential::captured(newer.clone())).unwrap();

		assert_eq!(store.load().unwrap().state, newer);
	}

	#[cfg(unix)]
	#[test]
	fn saved_session_is_owner_only() {
		use std::os::unix::fs::PermissionsExt;

		let tmp = TempDir::new().unwrap();
		let store = FileSessionStore::new(tmp.path().join("session.json"));
		store.save(&SessionCredential::captured(sample_state())).unwrap();

		let mode = fs::metadata(store.path()).unwrap().permissions().mode();
		assert_eq!(mode & 0o777, 0o600);
	}

	#[test]
	fn clear_reports_whether_file_existed() {
		let tmp = TempDir::new().unwrap();
		let store = FileSessionStore::new(tmp.path().join("session.json"));
		assert!(!store.clear().unwrap());

		store.save(&SessionCredential::captured(sample_state())).unwrap();
		assert!(store.clear().unwrap());
		assert!(store.load().is_none());
	}

	#[test]
	fn memory_store_counts_saves() {
		let store = MemorySessionStore::new();
		assert!(store.load().is_none());

		store.save(&SessionCredential::captured(sample_state())).unwrap();
		assert_eq!(store.save_count(), 1);
		assert_eq!(store.load().unwrap().source, CredentialSource::Loaded);
		assert_eq!(store.current().unwrap().source, CredentialSource::Captured);
	}
}
