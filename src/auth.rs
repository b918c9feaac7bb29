//! Bearer-token gate for `/v1/*` and CIDR allowlist gate for the UI subtree (§4.10).
//!
//! The bearer check mirrors the `Authorization: Bearer <token>` extraction in the
//! teacher's `rbac.rs`, replacing JWT decoding (out of scope here) with a constant-time
//! comparison against a single process-wide secret.

use http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
	#[error("missing or malformed Authorization header")]
	MissingBearer,
	#[error("bearer token does not match")]
	TokenMismatch,
	#[error("client address is not in the configured allowlist")]
	IpNotAllowed,
}

/// Constant-time byte comparison; deliberately not short-circuiting on first mismatch
/// so token-guessing can't be sped up by timing the response.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	if a.len() != b.len() {
		return false;
	}
	let mut diff = 0u8;
	for (x, y) in a.iter().zip(b.iter()) {
		diff |= x ^ y;
	}
	diff == 0
}

pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
	let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
	let (scheme, token) = value.split_once(' ')?;
	if scheme != "Bearer" {
		return None;
	}
	let token = token.trim();
	if token.is_empty() {
		None
	} else {
		Some(token)
	}
}

pub fn check_bearer(headers: &HeaderMap, expected: &str) -> Result<(), AuthError> {
	let token = extract_bearer(headers).ok_or(AuthError::MissingBearer)?;
	if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
		Ok(())
	} else {
		Err(AuthError::TokenMismatch)
	}
}

/// CIDR-based allowlist for the UI asset subtree. An empty allowlist means "no
/// restriction" (the operator opted out of IP gating entirely).
#[derive(Debug, Clone, Default)]
pub struct IpAllowlist {
	nets: Vec<IpNet>,
}

impl IpAllowlist {
	pub fn new(nets: Vec<IpNet>) -> Self {
		IpAllowlist { nets }
	}

	pub fn check(&self, addr: IpAddr) -> Result<(), AuthError> {
		if self.nets.is_empty() || self.nets.iter().any(|n| n.contains(&addr)) {
			Ok(())
		} else {
			Err(AuthError::IpNotAllowed)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn headers_with(value: &str) -> HeaderMap {
		let mut h = HeaderMap::new();
		h.insert(http::header::AUTHORIZATION, value.parse().unwrap());
		h
	}

	#[test]
	fn accepts_matching_token() {
		let headers = headers_with("Bearer sekret");
		assert!(check_bearer(&headers, "sekret").is_ok());
	}

	#[test]
	fn rejects_mismatched_token() {
		let headers = headers_with("Bearer wrong");
		assert_eq!(check_bearer(&headers, "sekret").unwrap_err(), AuthError::TokenMismatch);
	}

	#[test]
	fn rejects_missing_header() {
		let headers = HeaderMap::new();
		assert_eq!(check_bearer(&headers, "sekret").unwrap_err(), AuthError::MissingBearer);
	}

	#[test]
	fn rejects_non_bearer_scheme() {
		let headers = headers_with("Basic sekret");
		assert_eq!(check_bearer(&headers, "sekret").unwrap_err(), AuthError::MissingBearer);
	}

	#[test]
	fn empty_allowlist_permits_everything() {
		let allow = IpAllowlist::default();
		assert!(allow.check("10.0.0.5".parse().unwrap()).is_ok());
	}

	#[test]
	fn allowlist_blocks_outside_cidr() {
		let allow = IpAllowlist::new(vec!["192.168.0.0/16".parse().unwrap()]);
		assert!(allow.check("192.168.1.5".parse().unwrap()).is_ok());
		assert_eq!(
			allow.check("10.0.0.5".parse().unwrap()).unwrap_err(),
			AuthError::IpNotAllowed
		);
	}
}
