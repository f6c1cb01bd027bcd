use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use tradeflow::FileSessionStore;
use tradeflow_protocol::StorageState;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
	Present,
	Absent,
	Corrupt,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub file: PathBuf,
	pub status: SessionStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	pub cookie_count: usize,
	pub cookies: Vec<CookieSummary>,
	pub origins: Vec<OriginSummary>,
}

/// Cookie metadata. Values are never printed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CookieSummary {
	pub name: String,
	pub domain: Option<String>,
	pub expires: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginSummary {
	pub origin: String,
	pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearOutput {
	pub file: PathBuf,
	pub removed: bool,
}

pub fn show(path: &Path) -> Result<SessionSummary> {
	let store = FileSessionStore::new(path);
	let summary = |status, reason| SessionSummary {
		file: path.to_path_buf(),
		status,
		reason,
		cookie_count: 0,
		cookies: Vec::new(),
		origins: Vec::new(),
	};

	let loaded = match store.try_load() {
		Err(tradeflow::Error::SessionStoreCorrupt { reason, .. }) => return Ok(summary(SessionStatus::Corrupt, Some(reason))),
		other => other.with_context(|| format!("reading session file {}", path.display()))?,
	};

	Ok(match loaded {
		Some(credential) => summarise(path, &credential.state, unix_now()),
		None => summary(SessionStatus::Absent, None),
	})
}

pub fn clear(path: &Path) -> Result<ClearOutput> {
	let removed = FileSessionStore::new(path)
		.clear()
		.with_context(|| format!("removing session file {}", path.display()))?;
	Ok(ClearOutput {
		file: path.to_path_buf(),
		removed,
	})
}

fn summarise(path: &Path, state: &StorageState, now: i64) -> SessionSummary {
	let cookies = state
		.cookies
		.iter()
		.map(|cookie| CookieSummary {
			name: cookie.name.clone(),
			domain: cookie.domain.clone(),
			expires: format_expiry(cookie.expires, now),
		})
		.collect();

	let origins = state
		.origins
		.iter()
		.map(|origin| OriginSummary {
			origin: origin.origin.clone(),
			keys: origin.local_storage.iter().map(|entry| entry.name.clone()).collect(),
		})
		.collect();

	SessionSummary {
		file: path.to_path_buf(),
		status: SessionStatus::Present,
		reason: None,
		cookie_count: state.cookies.len(),
		cookies,
		origins,
	}
}

fn unix_now() -> i64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_secs() as i64)
		.unwrap_or(0)
}

/// Time left on a cookie as `Nm`, `Nh` or `Nd`; `session` for cookies
/// without an expiry and `expired` once `now` has passed it.
pub fn format_expiry(expires: Option<f64>, now: i64) -> String {
	let ts = match expires {
		None => return "session".into(),
		Some(ts) if ts < 0.0 => return "session".into(),
		Some(ts) => ts as i64,
	};

	if ts < now {
		return "expired".into();
	}

	match ts - now {
		d if d < 3600 => format!("{}m", d / 60),
		d if d < 86400 => format!("{}h", d / 3600),
		d => format!("{}d", d / 86400),
	}
}
