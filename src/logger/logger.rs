use crate::settings::{Log, LogFormat};
use anyhow::{Result, anyhow};
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl From<&Log> for LogConfig {
    fn from(log: &Log) -> Self {
        LogConfig {
            filter: log.filter.clone(),
            format: log.format,
        }
    }
}

type Filtered = Layered<reload::Layer<EnvFilter, Registry>, Registry>;
type FormatLayer = Box<dyn Layer<Filtered> + Send + Sync>;

pub struct Logger {
    filter_handle: reload::Handle<EnvFilter, Registry>,
    format_handle: reload::Handle<FormatLayer, Filtered>,
}

fn format_layer(format: LogFormat) -> FormatLayer {
    match format {
        LogFormat::Pretty => fmt::layer().boxed(),
        LogFormat::Json => fmt::layer().json().flatten_event(true).boxed(),
    }
}

impl Logger {
    /// Text output at `info` until settings are known.
    pub fn new_bootstrap() -> Self {
        let (filter, filter_handle) = reload::Layer::new(EnvFilter::new("info"));
        let (format, format_handle) = reload::Layer::new(format_layer(LogFormat::Pretty));

        tracing_subscriber::registry()
            .with(filter)
            .with(format)
            .init();

        Self {
            filter_handle,
            format_handle,
        }
    }

    pub fn reload_from_config(&self, config: &LogConfig) -> Result<()> {
        let filter = EnvFilter::try_new(&config.filter).map_err(|e| anyhow!(e))?;
        self.filter_handle.reload(filter).map_err(|e| anyhow!(e))?;
        if config.format != LogFormat::Pretty {
            self.format_handle
                .reload(format_layer(config.format))
                .map_err(|e| anyhow!(e))?;
        }
        Ok(())
    }
}
