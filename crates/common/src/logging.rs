//! Provides utilities to initialize logging and OpenTelemetry tracing for the vigilante daemons.
use std::env;

use opentelemetry::{trace::TracerProvider, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Environment variable holding the OTLP collector endpoint.
pub const OTLP_URL_ENVVAR: &str = "VIGILANTE_OTLP_URL";

/// Environment variable name for the service label, which is appended to the whoami string.
pub const SVC_LABEL_ENVVAR: &str = "VIGILANTE_SVC_LABEL";

/// Errors that can occur while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingInitError {
    /// The OTLP span exporter could not be built.
    #[error("could not build otlp exporter: {0}")]
    Exporter(String),

    /// A global subscriber has already been installed.
    #[error("could not install global subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Configuration for the logger.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Identifies the service in logs and in exported traces.
    whoami: String,

    /// The OpenTelemetry URL for exporting traces.
    otel_url: Option<String>,

    /// Include the source file in every event.
    with_file: bool,

    /// Include the line number in every event.
    with_line_number: bool,
}

impl LoggerConfig {
    /// Creates a new instance with only the whoami set.
    pub const fn new(whoami: String) -> Self {
        Self {
            whoami,
            otel_url: None,
            with_file: false,
            with_line_number: false,
        }
    }

    /// Creates a new instance for the given service name, reading the optional parts
    /// (service label, OTLP endpoint, `LOG_FILE`, `LOG_LINE_NUM`) from the environment.
    pub fn from_env(base: &str) -> Self {
        let mut config = Self::new(get_whoami_string(base));
        config.otel_url = get_otlp_url_from_env();
        config.with_file = env::var("LOG_FILE").is_ok_and(|v| v == "1");
        config.with_line_number = env::var("LOG_LINE_NUM").is_ok_and(|v| v == "1");
        config
    }

    /// Sets the opentelemetry URL to the provided string.
    pub fn set_otlp_url(&mut self, url: String) {
        self.otel_url = Some(url);
    }

    /// Returns the whoami string.
    pub fn whoami(&self) -> &str {
        &self.whoami
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::from_env("vigilante")
    }
}

/// Initializes the logging subsystem with the provided config.
pub fn init(config: LoggerConfig) -> Result<(), LoggingInitError> {
    let filt = tracing_subscriber::EnvFilter::from_default_env();

    let stdout_sub = tracing_subscriber::fmt::layer()
        .compact()
        .event_format(
            tracing_subscriber::fmt::format()
                .with_file(config.with_file)
                .with_line_number(config.with_line_number),
        )
        .with_filter(filt);

    match &config.otel_url {
        Some(otel_url) => {
            let resource = Resource::builder()
                .with_attribute(KeyValue::new("service.name", config.whoami.clone()))
                .build();

            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(otel_url)
                .build()
                .map_err(|e| LoggingInitError::Exporter(e.to_string()))?;

            let tp = opentelemetry_sdk::trace::SdkTracerProvider::builder()
                .with_resource(resource)
                .with_batch_exporter(exporter)
                .build();

            let otel_sub = tracing_opentelemetry::layer().with_tracer(tp.tracer("vigilante"));

            tracing_subscriber::registry()
                .with(stdout_sub)
                .with(otel_sub)
                .try_init()?;
        }
        None => tracing_subscriber::registry().with(stdout_sub).try_init()?,
    }

    info!(whoami = %config.whoami, otlp = config.otel_url.is_some(), "logging started");
    Ok(())
}

/// Gets the OTLP URL from the standard envvar.
pub fn get_otlp_url_from_env() -> Option<String> {
    env::var(OTLP_URL_ENVVAR).ok()
}

/// Gets the service label from the standard envvar, which should be included in the whoami
/// string.
pub fn get_service_label_from_env() -> Option<String> {
    env::var(SVC_LABEL_ENVVAR).ok()
}

/// Computes a standard whoami string.
pub fn get_whoami_string(base: &str) -> String {
    match get_service_label_from_env() {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
