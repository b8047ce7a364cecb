use crate::layer::LoggerLayer;
use crate::logger::Logger;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for the global `tracing` subscriber built around a [`Logger`].
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt` layer is added
///   next to [`LoggerLayer`] so events are also printed in `fmt`'s compact
///   format. Leave it off when the logger itself writes the console.
#[derive(Clone, Debug, Default)]
pub struct InitConfig {
    pub enable_stdout: bool,
}

/// Install a global `tracing` subscriber that forwards every event to
/// `logger`.
///
/// **Parameters**
/// - `logger`: shared [`Logger`] receiving the events.
/// - `config`: [`InitConfig`] controlling the extra `fmt` output.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(
    logger: Arc<Logger>,
    config: InitConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = LoggerLayer::new(logger);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Install the forwarding subscriber with [`InitConfig::default`].
pub fn init_tracing(logger: Arc<Logger>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(logger, InitConfig::default())
}
