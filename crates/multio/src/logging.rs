use std::str::FromStr;

use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// A part of the system whose verbosity can be set on its own.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Section {
    /// Multiplexer engine, delivery workers and stream endpoints.
    Mux,
    /// Frame reader and writer.
    Frame,
    /// Sockets and closers.
    Transport,
    /// The subcommands themselves.
    Cli,
}

impl Section {
    /// Event target prefix covering the section.
    fn target(self) -> &'static str {
        match self {
            Section::Mux => "multio_mux",
            Section::Frame => "multio_frame",
            Section::Transport => "multio_transport",
            Section::Cli => "multio::cmd",
        }
    }
}

/// `--log-section mux=debug`: a level for one section, overriding
/// `--log-level` there.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SectionLevel {
    pub section: Section,
    pub level: LogLevel,
}

impl FromStr for SectionLevel {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (section, level) = input
            .split_once('=')
            .ok_or_else(|| format!("expected SECTION=LEVEL, got {input:?}"))?;
        Ok(Self {
            section: <Section as ValueEnum>::from_str(section.trim(), true)?,
            level: <LogLevel as ValueEnum>::from_str(level.trim(), true)?,
        })
    }
}

/// Default level everywhere, with per-section overrides. A later override
/// for the same section wins.
pub fn section_filter(level: LogLevel, sections: &[SectionLevel]) -> Targets {
    let mut targets = Targets::new().with_default(level.as_filter());
    for (i, entry) in sections.iter().enumerate() {
        if sections[i + 1..].iter().any(|later| later.section == entry.section) {
            continue;
        }
        targets = targets.with_target(entry.section.target(), entry.level.as_filter());
    }
    targets
}

/// Install the process-wide subscriber. Logs go to stderr so stdout stays
/// free for stream payloads.
pub fn init_logging(format: LogFormat, level: LogLevel, sections: &[SectionLevel]) {
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(!sections.is_empty());
    let registry = tracing_subscriber::registry().with(section_filter(level, sections));

    match format {
        LogFormat::Text => {
            let _ = registry.with(layer).try_init();
        }
        LogFormat::Json => {
            let _ = registry.with(layer.json()).try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn parses_section_levels() {
        let parsed: SectionLevel = "mux=debug".parse().unwrap();
        assert_eq!(
            parsed,
            SectionLevel {
                section: Section::Mux,
                level: LogLevel::Debug,
            }
        );
        assert_eq!(
            "Transport = OFF".parse::<SectionLevel>().unwrap().level,
            LogLevel::Off
        );
    }

    #[test]
    fn rejects_malformed_section_levels() {
        assert!("mux".parse::<SectionLevel>().is_err());
        assert!("engine=debug".parse::<SectionLevel>().is_err());
        assert!("mux=loud".parse::<SectionLevel>().is_err());
    }

    #[test]
    fn section_overrides_default_level() {
        let filter = section_filter(
            LogLevel::Error,
            &[
                "mux=trace".parse().unwrap(),
                "frame=off".parse().unwrap(),
            ],
        );

        assert!(filter.would_enable("multio_mux::delivery", &Level::TRACE));
        assert!(!filter.would_enable("multio_frame::reader", &Level::ERROR));
        assert!(filter.would_enable("multio_transport::uds", &Level::ERROR));
        assert!(!filter.would_enable("multio_transport::uds", &Level::INFO));
    }

    #[test]
    fn cli_section_does_not_leak_into_library_crates() {
        let filter = section_filter(LogLevel::Warn, &["cli=debug".parse().unwrap()]);

        assert!(filter.would_enable("multio::cmd::listen", &Level::DEBUG));
        assert!(!filter.would_enable("multio_mux::mux", &Level::DEBUG));
    }

    #[test]
    fn last_setting_for_a_section_wins() {
        let filter = section_filter(
            LogLevel::Info,
            &["mux=trace".parse().unwrap(), "mux=error".parse().unwrap()],
        );

        assert!(filter.would_enable("multio_mux::mux", &Level::ERROR));
        assert!(!filter.would_enable("multio_mux::mux", &Level::WARN));
    }
}
