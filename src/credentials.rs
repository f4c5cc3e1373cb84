use crate::config::Settings;
use crate::panos::QueryError;
use std::io::{self, BufRead, IsTerminal, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(
        "no API key available; pass --key, save one with `panwctl configure --api-key`, or run interactively"
    )]
    MissingKey,
    #[error("no username available; pass --user or save one with `panwctl configure --user`")]
    MissingUser,
    #[error("no password available; pass --password or use key based authentication")]
    MissingPassword,
    #[error("key generation failed: {0}")]
    Exchange(QueryError),
    #[error("reading credentials: {0}")]
    Prompt(#[from] io::Error),
}

/// An API key, plus the username it was generated for when it came from an
/// interactive exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub key: String,
    pub username: Option<String>,
}

/// API-key precedence: explicit flag, then the saved key, then an
/// interactive username/password exchange against the vendor keygen
/// endpoint. The exchange is injected so callers decide which host answers
/// it and tests stay offline.
pub fn resolve_key<F>(
    explicit: Option<String>,
    settings: &Settings,
    interactive: bool,
    exchange: F,
) -> Result<Credential, CredentialError>
where
    F: FnOnce(&str, &str) -> Result<String, QueryError>,
{
    if let Some(key) = explicit {
        return Ok(Credential {
            key,
            username: None,
        });
    }
    if let Some(key) = &settings.api_key {
        return Ok(Credential {
            key: key.clone(),
            username: None,
        });
    }
    if !interactive {
        return Err(CredentialError::MissingKey);
    }

    let username = prompt_username(settings.default_user.as_deref())?;
    let password = rpassword::prompt_password(format!("Password ({username}): "))?;
    let key = exchange(&username, &password).map_err(CredentialError::Exchange)?;
    Ok(Credential {
        key,
        username: Some(username),
    })
}

/// Username precedence for SSH and keygen: explicit flag, then the saved
/// default user.
pub fn resolve_user(explicit: Option<String>, settings: &Settings) -> Result<String, CredentialError> {
    explicit
        .or_else(|| settings.default_user.clone())
        .ok_or(CredentialError::MissingUser)
}

/// Password for SSH sessions: explicit flag, then a hidden prompt when a
/// terminal is attached. Piped invocations have surrendered stdin to the
/// target list, so they must pass --password or use key based auth.
pub fn resolve_password(explicit: Option<String>, user: &str) -> Result<String, CredentialError> {
    if let Some(password) = explicit {
        return Ok(password);
    }
    if !io::stdin().is_terminal() {
        return Err(CredentialError::MissingPassword);
    }
    Ok(rpassword::prompt_password(format!("Password ({user}): "))?)
}

pub fn prompt_username(default: Option<&str>) -> Result<String, CredentialError> {
    match default {
        Some(user) => eprint!("Username [{user}]: "),
        None => eprint!("Username: "),
    }
    io::stderr().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let entered = line.trim();
    if !entered.is_empty() {
        return Ok(entered.to_string());
    }
    default
        .map(str::to_string)
        .ok_or(CredentialError::MissingUser)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(key: Option<&str>, user: Option<&str>) -> Settings {
        Settings {
            api_key: key.map(str::to_string),
            default_user: user.map(str::to_string),
            ..Settings::default()
        }
    }

    fn no_exchange(_: &str, _: &str) -> Result<String, QueryError> {
        panic!("exchange must not run");
    }

    #[test]
    fn explicit_key_beats_saved_key() {
        let credential = resolve_key(
            Some("explicit".into()),
            &saved(Some("saved"), None),
            false,
            no_exchange,
        )
        .unwrap();
        assert_eq!(credential.key, "explicit");
        assert_eq!(credential.username, None);
    }

    #[test]
    fn saved_key_is_used_when_no_explicit_key() {
        let credential =
            resolve_key(None, &saved(Some("saved"), None), false, no_exchange).unwrap();
        assert_eq!(credential.key, "saved");
    }

    #[test]
    fn missing_key_without_a_terminal_is_an_error() {
        let err = resolve_key(None, &saved(None, None), false, no_exchange).unwrap_err();
        assert!(matches!(err, CredentialError::MissingKey));
    }

    #[test]
    fn user_precedence_is_explicit_then_saved() {
        let user = resolve_user(Some("cli-user".into()), &saved(None, Some("saved-user"))).unwrap();
        assert_eq!(user, "cli-user");

        let user = resolve_user(None, &saved(None, Some("saved-user"))).unwrap();
        assert_eq!(user, "saved-user");

        let err = resolve_user(None, &saved(None, None)).unwrap_err();
        assert!(matches!(err, CredentialError::MissingUser));
    }

    #[test]
    fn explicit_password_skips_the_prompt() {
        let password = resolve_password(Some("hunter2".into()), "netops").unwrap();
        assert_eq!(password, "hunter2");
    }
}
