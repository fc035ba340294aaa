use tgcli_core::{
    config::Config,
    ports::{Authenticator, Transport},
    Result,
};

/// A connected Telegram account: read side plus auth.
pub trait Telegram: Transport + Authenticator {}

impl<T: Transport + Authenticator + ?Sized> Telegram for T {}

/// Connect with the stored session string, if any.
#[cfg(feature = "mtproto")]
pub async fn connect(cfg: &Config, session: Option<&str>) -> Result<Box<dyn Telegram>> {
    let client = crate::mtproto::MtprotoClient::connect(cfg, session).await?;
    Ok(Box::new(client))
}

#[cfg(not(feature = "mtproto"))]
pub async fn connect(_cfg: &Config, _session: Option<&str>) -> Result<Box<dyn Telegram>> {
    Err(tgcli_core::Error::Config(
        "this build has no Telegram client; reinstall with `cargo install tgcli --features mtproto`"
            .to_string(),
    ))
}
