use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, Result};
use crate::storage::{LOGGED_IN_USER_KEY, Storage, StorageError, USERS_KEY};

/// User data structure representing a registered application user
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Display name, shown once logged in
    pub username: String,

    /// Email address (the login identifier, unique)
    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

/// Signup form data
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    /// Password in plaintext (only transmitted, never stored)
    pub password: String,
    /// Must repeat `password`
    pub re_password: String,
}

/// Login form data
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registered users and the session marker, both kept in a [`Storage`]
pub struct Accounts<S: Storage> {
    storage: S,
}

impl<S: Storage> Accounts<S> {
    pub fn new(storage: S) -> Self {
        Accounts { storage }
    }

    /// Get all registered users
    ///
    /// A missing or undecodable users list reads as empty.
    pub fn users(&self) -> Result<Vec<User>> {
        let Some(payload) = self.storage.get(USERS_KEY)? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&payload) {
            Ok(users) => Ok(users),
            Err(e) => {
                warn!("stored users failed to decode, treating as empty: {}", e);
                Ok(Vec::new())
            }
        }
    }

    fn save_users(&self, users: &[User]) -> Result<()> {
        let json = serde_json::to_string(users).map_err(StorageError::from)?;
        self.storage.set(USERS_KEY, &json)?;
        Ok(())
    }

    /// Register a new user
    ///
    /// The password is hashed before storage. Signing up does not log the
    /// user in.
    ///
    /// # Errors
    /// * `Validation` if any field is empty
    /// * `PasswordMismatch` if the two passwords differ
    /// * `DuplicateUser` if the email is already registered
    pub fn signup(&self, form: &SignupForm) -> Result<User> {
        let missing: Vec<&'static str> = [
            ("username", form.username.trim()),
            ("email", form.email.trim()),
            ("password", form.password.as_str()),
            ("rePassword", form.re_password.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(InventoryError::Validation(missing));
        }

        if form.password != form.re_password {
            return Err(InventoryError::PasswordMismatch);
        }

        let email = form.email.trim();
        let mut users = self.users()?;
        if users.iter().any(|user| user.email == email) {
            return Err(InventoryError::DuplicateUser(email.to_string()));
        }

        let user = User {
            username: form.username.trim().to_string(),
            email: email.to_string(),
            password_hash: hash_password(&form.password)?,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        self.save_users(&users)?;

        info!("registered user {}", user.username);
        Ok(user)
    }

    /// Verify credentials and start a session
    ///
    /// # Returns
    /// * `Result<String>` - The logged-in username
    ///
    /// # Errors
    /// * `Validation` if email or password is empty
    /// * `Auth` if no user matches the email/password pair
    pub fn login(&self, form: &LoginForm) -> Result<String> {
        let email = form.email.trim();
        let mut missing = Vec::new();
        if email.is_empty() {
            missing.push("email");
        }
        if form.password.is_empty() {
            missing.push("password");
        }
        if !missing.is_empty() {
            return Err(InventoryError::Validation(missing));
        }

        let users = self.users()?;
        let user = users
            .iter()
            .find(|user| user.email == email && verify_password(&form.password, &user.password_hash))
            .ok_or(InventoryError::Auth)?;

        self.storage.set(LOGGED_IN_USER_KEY, &user.username)?;
        info!("{} logged in", user.username);
        Ok(user.username.clone())
    }

    /// End the current session, if any
    pub fn logout(&self) -> Result<()> {
        self.storage.remove(LOGGED_IN_USER_KEY)?;
        Ok(())
    }

    /// Username of the logged-in user
    pub fn current_user(&self) -> Result<Option<String>> {
        Ok(self
            .storage
            .get(LOGGED_IN_USER_KEY)?
            .filter(|name| !name.is_empty()))
    }
}

/// Hash a password using Argon2
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| InventoryError::Hash)
}

/// Verify a password against a stored hash
///
/// A hash in an unexpected format never matches.
fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_original_password() {
        let hash = hash_password("hunter2").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "plaintext"));
    }
}
