use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Fmt Layer for console output.
pub enum FmtLayer {
    /// Output traces to stdout.
    Stdout,
    /// Output traces to stderr.
    Stderr,
}

/// Tracing telemetry style.
#[derive(Debug, Clone, Copy, strum_macros::EnumString, strum_macros::AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum FmtStyle {
    /// Compact style.
    Compact,
    /// Pretty Style.
    Pretty,
    /// JSON Style.
    Json,
}

/// Tracing telemetry builder.
pub struct TracingTelemetry {
    writer: FmtLayer,
    style: FmtStyle,
    colours: bool,
}

impl TracingTelemetry {
    /// Tracing telemetry default builder.
    pub fn builder() -> Self {
        Self {
            writer: FmtLayer::Stdout,
            style: FmtStyle::Pretty,
            colours: true,
        }
    }
    /// Specify writer stream.
    pub fn with_writer(self, writer: FmtLayer) -> TracingTelemetry {
        TracingTelemetry { writer, ..self }
    }
    /// Specify style.
    pub fn with_style(self, style: FmtStyle) -> TracingTelemetry {
        TracingTelemetry { style, ..self }
    }
    /// Specify whether colour is needed or not.
    pub fn with_colours(self, colours: bool) -> TracingTelemetry {
        TracingTelemetry { colours, ..self }
    }

    /// Initialize the telemetry instance.
    /// The log level is taken from `RUST_LOG`, defaulting to info.
    pub fn init(self, service_name: &str) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = Registry::default().with(filter);

        match (self.writer, self.style) {
            (FmtLayer::Stdout, FmtStyle::Compact) => subscriber
                .with(fmt::layer().with_ansi(self.colours).compact())
                .init(),
            (FmtLayer::Stderr, FmtStyle::Compact) => subscriber
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(self.colours)
                        .compact(),
                )
                .init(),
            (FmtLayer::Stdout, FmtStyle::Pretty) => subscriber
                .with(fmt::layer().with_ansi(self.colours).pretty())
                .init(),
            (FmtLayer::Stderr, FmtStyle::Pretty) => subscriber
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_ansi(self.colours)
                        .pretty(),
                )
                .init(),
            (FmtLayer::Stdout, FmtStyle::Json) => subscriber.with(fmt::layer().json()).init(),
            (FmtLayer::Stderr, FmtStyle::Json) => subscriber
                .with(fmt::layer().with_writer(std::io::stderr).json())
                .init(),
        };
        tracing::info!(service = service_name, "Tracing initialised");
    }
}

/// Initialise tracing with the given style, writing to stdout.
pub fn init_tracing(service_name: &str, style: FmtStyle) {
    TracingTelemetry::builder()
        .with_style(style)
        .init(service_name);
}
