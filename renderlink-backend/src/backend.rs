//! The backend trait and the URI-keyed factory

use std::time::Instant;

use state_store::StateDict;

use crate::command::BackendCommand;
use crate::config::BackendConfig;
use crate::error::{BackendError, Result};

/// A player adapter driven by cooperative polling
///
/// `ping` and `handle_msg` never block for long: network round trips are
/// bounded by the configured timeouts. An `Err` from either means the
/// player is gone and the adapter should be destroyed.
pub trait Backend: Send {
    /// Poll the player; returns the amount of work done
    fn ping(&mut self, now: Instant) -> Result<usize>;

    /// Apply one command; returns false when the backend should quit
    fn handle_msg(&mut self, cmd: BackendCommand, now: Instant) -> Result<bool>;

    /// Release the player connection
    fn destroy(&mut self);

    /// Dictionary this backend publishes into
    fn state(&self) -> &StateDict;

    fn kind(&self) -> BackendKind;
}

/// Player families, keyed by URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Mpd,
    Mpris2,
    UpnpRenderer,
}

impl BackendKind {
    const ALL: [BackendKind; 3] = [BackendKind::Mpd, BackendKind::Mpris2, BackendKind::UpnpRenderer];

    pub fn scheme(self) -> &'static str {
        match self {
            BackendKind::Mpd => "mpd",
            BackendKind::Mpris2 => "mpris2",
            BackendKind::UpnpRenderer => "upnp-renderer",
        }
    }

    /// Backend kind for a `<scheme>://...` URI
    pub fn from_uri(uri: &str) -> Option<Self> {
        let (scheme, _) = uri.split_once("://")?;
        Self::ALL
            .into_iter()
            .find(|kind| kind.scheme().eq_ignore_ascii_case(scheme))
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Create the backend handling `uri`
///
/// Fails with `UnsupportedUri` for unknown schemes, and for `mpris2://`
/// when the crate is built without the `dbus` feature.
pub fn create_backend(
    uri: &str,
    config: &BackendConfig,
    state: StateDict,
) -> Result<Box<dyn Backend>> {
    config.validate()?;

    let kind = BackendKind::from_uri(uri).ok_or_else(|| BackendError::UnsupportedUri(uri.to_string()))?;
    tracing::info!("Creating {} backend for {}", kind, uri);

    match kind {
        BackendKind::Mpd => Ok(Box::new(crate::mpd::MpdBackend::connect(uri, config, state)?)),
        BackendKind::UpnpRenderer => {
            Ok(Box::new(crate::upnp::UpnpBackend::connect(uri, config, state)?))
        }
        #[cfg(feature = "dbus")]
        BackendKind::Mpris2 => Ok(Box::new(crate::mpris2::Mpris2Backend::connect(uri, config, state)?)),
        #[cfg(not(feature = "dbus"))]
        BackendKind::Mpris2 => Err(BackendError::UnsupportedUri(format!(
            "{} (built without D-Bus support)",
            uri
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("mpd://localhost:6600", Some(BackendKind::Mpd))]
    #[case("mpris2://vlc", Some(BackendKind::Mpris2))]
    #[case("upnp-renderer://192.168.1.20:1400/xml/device_description.xml", Some(BackendKind::UpnpRenderer))]
    #[case("UPNP-RENDERER://host/desc.xml", Some(BackendKind::UpnpRenderer))]
    #[case("upnp-server://host/desc.xml", None)]
    #[case("mpd", None)]
    #[case("", None)]
    fn test_kind_from_uri(#[case] uri: &str, #[case] expected: Option<BackendKind>) {
        assert_eq!(BackendKind::from_uri(uri), expected);
    }

    #[test]
    fn test_create_unknown_scheme() {
        let result = create_backend("ftp://host", &BackendConfig::default(), StateDict::new());
        assert!(matches!(result, Err(BackendError::UnsupportedUri(_))));
    }

    #[test]
    fn test_create_rejects_invalid_config() {
        let config = BackendConfig::default().with_mpd_poll_interval(std::time::Duration::ZERO);
        let result = create_backend("mpd://localhost", &config, StateDict::new());
        assert!(matches!(result, Err(BackendError::Config(_))));
    }

    #[cfg(not(feature = "dbus"))]
    #[test]
    fn test_mpris2_needs_dbus_feature() {
        let result = create_backend("mpris2://vlc", &BackendConfig::default(), StateDict::new());
        assert!(matches!(result, Err(BackendError::UnsupportedUri(_))));
    }
}
