use std::sync::OnceLock;

use argon2::{
	password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
	Argon2,
};

/// Hashes a password with Argon2id under a fresh random salt.
///
/// The salt and parameters are embedded in the returned PHC string, so
/// nothing else needs to be stored alongside it.
pub fn hash(password: &str) -> Result<String, argon2::password_hash::Error> {
	let salt = SaltString::generate(&mut OsRng);

	Ok(Argon2::default()
		.hash_password(password.as_bytes(), &salt)?
		.to_string())
}

/// Verifies a password against a stored PHC hash.
///
/// A stored hash that does not parse can never authenticate, but it must not
/// bring the caller down either.
pub fn verify(password: &str, stored: &str) -> bool {
	let Ok(parsed) = PasswordHash::new(stored) else {
		return false;
	};

	Argon2::default()
		.verify_password(password.as_bytes(), &parsed)
		.is_ok()
}

/// Burns one verification against a fixed hash, so a login for an unknown
/// username costs the same as one for a known username.
pub fn burn(password: &str) {
	static DUMMY: OnceLock<String> = OnceLock::new();

	let dummy = DUMMY.get_or_init(|| hash("correct horse battery staple").unwrap_or_default());

	let _ = verify(password, dummy);
}
