use crate::error::AppError;
use crate::remote::AuthApi;
use crate::storage::preferences::PreferenceStore;

const LOCAL_PART_SYMBOLS: &str = ".!#$%&'*+/=?^_`{|}~-";

/// Loose address check: `local@domain.tld` with no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.len() > 64 || domain.contains('@') {
        return false;
    }
    if !local
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || LOCAL_PART_SYMBOLS.contains(ch))
    {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-')
        })
}

/// Exchanges the email for a token and records the session.
pub fn login<A: AuthApi>(
    api: &A,
    preferences: &PreferenceStore,
    email: &str,
) -> Result<(), AppError> {
    let email = email.trim();
    if !is_valid_email(email) {
        return Err(AppError::invalid_input("please enter a valid email"));
    }

    let token = api.login(email)?;
    preferences.start_session(&token)?;
    log::info!("logged in as {email}");
    Ok(())
}

pub fn logout(preferences: &PreferenceStore) -> Result<(), AppError> {
    preferences.clear_session()?;
    log::info!("logged out");
    Ok(())
}
