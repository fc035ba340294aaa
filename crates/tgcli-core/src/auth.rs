//! Login / logout / status flows over the `Authenticator` and `SessionStore` ports.

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    domain::Entity,
    errors::Error,
    ports::{Authenticator, Prompter, SessionStore, SignIn},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub phone: Option<String>,
    pub session_exists: bool,
}

/// Interactive login: phone, verification code, and the 2FA password when the
/// account has one. The session is saved only after a successful sign-in.
pub async fn login<A>(auth: &A, prompter: &mut dyn Prompter, store: &dyn SessionStore) -> Result<Entity>
where
    A: Authenticator + ?Sized,
{
    if !auth.is_authorized().await? {
        let phone = prompter.prompt("Phone number")?;
        let phone = normalize_phone(&phone)
            .ok_or_else(|| Error::InvalidArgument(format!("invalid phone number: {phone:?}")))?;
        auth.request_code(&phone).await?;

        let code = prompter.prompt("Verification code")?;
        match auth.sign_in(code.trim()).await? {
            SignIn::Done => {}
            SignIn::PasswordRequired { hint } => {
                let label = match hint {
                    Some(h) if !h.trim().is_empty() => format!("2FA password (hint: {h})"),
                    _ => "2FA password".to_string(),
                };
                let password = prompter.prompt_secret(&label)?;
                auth.check_password(&password).await?;
            }
        }
    }

    store.save(&auth.export_session()?)?;
    let me = auth.me().await?;
    info!(name = %me.display_name(), "logged in");
    Ok(me)
}

/// Log out remotely when possible, then always delete the local session.
///
/// `auth` is `None` when no connection could be made. Returns whether a remote
/// log-out happened.
pub async fn logout<A>(auth: Option<&A>, store: &dyn SessionStore) -> Result<bool>
where
    A: Authenticator + ?Sized,
{
    let mut remote = false;
    if let Some(auth) = auth {
        match auth.is_authorized().await {
            Ok(true) => match auth.log_out().await {
                Ok(()) => remote = true,
                Err(e) => warn!(error = %e, "remote log-out failed"),
            },
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not check authorization"),
        }
    }
    store.delete()?;
    Ok(remote)
}

/// Current auth state. The transport is only consulted when a session exists.
pub async fn status<A>(store: &dyn SessionStore, auth: Option<&A>) -> Result<AuthStatus>
where
    A: Authenticator + ?Sized,
{
    let session_exists = store.load()?.is_some();
    let signed_out = AuthStatus {
        authenticated: false,
        phone: None,
        session_exists,
    };
    let (true, Some(auth)) = (session_exists, auth) else {
        return Ok(signed_out);
    };

    if !auth.is_authorized().await? {
        return Ok(signed_out);
    }
    let me = auth.me().await?;
    Ok(AuthStatus {
        authenticated: true,
        phone: me.phone().map(mask_phone),
        session_exists,
    })
}

/// Keep the first 3 and last 2 characters of a phone number.
pub fn mask_phone(phone: &str) -> String {
    let chars: Vec<char> = phone.chars().collect();
    if chars.len() <= 5 {
        return phone.to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 5))
}

/// Strip spaces and dashes; a leading `+` is optional but the country code is not.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    if digits.len() < 7 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("+{digits}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        value: Mutex<Option<String>>,
        deletes: Mutex<usize>,
    }

    impl SessionStore for MemoryStore {
        fn load(&self) -> Result<Option<String>> {
            Ok(self.value.lock().unwrap().clone())
        }

        fn save(&self, session: &str) -> Result<()> {
            *self.value.lock().unwrap() = Some(session.to_string());
            Ok(())
        }

        fn delete(&self) -> Result<()> {
            *self.deletes.lock().unwrap() += 1;
            *self.value.lock().unwrap() = None;
            Ok(())
        }
    }

    struct Script(VecDeque<String>);

    impl Prompter for Script {
        fn prompt(&mut self, label: &str) -> Result<String> {
            self.0
                .pop_front()
                .ok_or_else(|| Error::InvalidArgument(format!("unexpected prompt: {label}")))
        }
    }

    fn script(answers: &[&str]) -> Script {
        Script(answers.iter().map(|s| s.to_string()).collect())
    }

    #[derive(Default)]
    struct FakeAuth {
        authorized: Mutex<bool>,
        needs_password: bool,
        fail_logout: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakeAuth {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Authenticator for FakeAuth {
        async fn is_authorized(&self) -> Result<bool> {
            Ok(*self.authorized.lock().unwrap())
        }

        async fn request_code(&self, phone: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("code:{phone}"));
            Ok(())
        }

        async fn sign_in(&self, code: &str) -> Result<SignIn> {
            self.calls.lock().unwrap().push(format!("sign_in:{code}"));
            if self.needs_password {
                return Ok(SignIn::PasswordRequired {
                    hint: Some("pet".to_string()),
                });
            }
            *self.authorized.lock().unwrap() = true;
            Ok(SignIn::Done)
        }

        async fn check_password(&self, password: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("password:{password}"));
            *self.authorized.lock().unwrap() = true;
            Ok(())
        }

        async fn me(&self) -> Result<Entity> {
            Ok(Entity::User {
                id: 1,
                first_name: Some("Takeshi".into()),
                last_name: None,
                username: None,
                phone: Some("819012345678".into()),
            })
        }

        async fn log_out(&self) -> Result<()> {
            self.calls.lock().unwrap().push("log_out".to_string());
            if self.fail_logout {
                return Err(Error::Transport("network down".into()));
            }
            Ok(())
        }

        fn export_session(&self) -> Result<String> {
            Ok("exported".to_string())
        }
    }

    #[tokio::test]
    async fn login_saves_session_after_code() {
        let auth = FakeAuth::default();
        let store = MemoryStore::default();
        let me = login(&auth, &mut script(&["+81 90-1234-5678", "12345"]), &store)
            .await
            .unwrap();
        assert_eq!(me.display_name(), "Takeshi");
        assert_eq!(auth.calls(), ["code:+819012345678", "sign_in:12345"]);
        assert_eq!(store.load().unwrap().as_deref(), Some("exported"));
    }

    #[tokio::test]
    async fn login_asks_for_2fa_password() {
        let auth = FakeAuth {
            needs_password: true,
            ..Default::default()
        };
        let store = MemoryStore::default();
        login(&auth, &mut script(&["819012345678", "111", "hunter2"]), &store)
            .await
            .unwrap();
        assert_eq!(auth.calls().last().map(String::as_str), Some("password:hunter2"));
        assert!(store.load().unwrap().is_some());
    }

    #[tokio::test]
    async fn login_rejects_garbage_phone_without_saving() {
        let auth = FakeAuth::default();
        let store = MemoryStore::default();
        let err = login(&auth, &mut script(&["call me"]), &store).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_authorized_logs_out_and_deletes() {
        let auth = FakeAuth {
            authorized: Mutex::new(true),
            ..Default::default()
        };
        let store = MemoryStore::default();
        store.save("s").unwrap();
        assert!(logout(Some(&auth), &store).await.unwrap());
        assert_eq!(auth.calls(), ["log_out"]);
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_not_authorized_only_deletes() {
        let auth = FakeAuth::default();
        let store = MemoryStore::default();
        assert!(!logout(Some(&auth), &store).await.unwrap());
        assert!(auth.calls().is_empty());
        assert_eq!(*store.deletes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn logout_deletes_local_session_when_remote_fails() {
        let auth = FakeAuth {
            authorized: Mutex::new(true),
            fail_logout: true,
            ..Default::default()
        };
        let store = MemoryStore::default();
        store.save("s").unwrap();
        assert!(!logout(Some(&auth), &store).await.unwrap());
        assert!(store.load().unwrap().is_none());

        let store = MemoryStore::default();
        logout::<FakeAuth>(None, &store).await.unwrap();
        assert_eq!(*store.deletes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn status_without_session_skips_transport() {
        let auth = FakeAuth {
            authorized: Mutex::new(true),
            ..Default::default()
        };
        let st = status(&MemoryStore::default(), Some(&auth)).await.unwrap();
        assert_eq!(
            st,
            AuthStatus {
                authenticated: false,
                phone: None,
                session_exists: false
            }
        );
    }

    #[tokio::test]
    async fn status_reports_masked_phone() {
        let auth = FakeAuth {
            authorized: Mutex::new(true),
            ..Default::default()
        };
        let store = MemoryStore::default();
        store.save("s").unwrap();
        let st = status(&store, Some(&auth)).await.unwrap();
        assert!(st.authenticated);
        assert!(st.session_exists);
        assert_eq!(st.phone.as_deref(), Some("819*******78"));
    }

    #[test]
    fn mask_phone_short_numbers_untouched() {
        assert_eq!(mask_phone("12345"), "12345");
        assert_eq!(mask_phone("123456"), "123*56");
    }

    #[test]
    fn normalize_phone_accepts_common_spellings() {
        assert_eq!(normalize_phone("+81 90 1234 5678").as_deref(), Some("+819012345678"));
        assert_eq!(normalize_phone("1-555-010-9999").as_deref(), Some("+15550109999"));
        assert_eq!(normalize_phone("12"), None);
        assert_eq!(normalize_phone("phone"), None);
    }
}
