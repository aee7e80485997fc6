//! LabMetal certificate CLI
//!
//! Renders certificates without a browser through the same composer,
//! selector and hand-off code as the web page.

mod host;

use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, bail, Context, Result};
use certificate_core::{
    deep_link, manual_attach_note, normalize_phone, share_message, CertificateRecord,
    ClientDirectory, ContactInfo, DeviceClass, Field, LayoutTable, RasterFormat, ToolConfig,
};
use certificate_render::{
    parse_placed_text, CertificateSession, HandoffAdapter, RenderError, RenderStrategySelector,
    SessionError, SyntheticCanvasBackend, TemplateRasterBackend, Timer, TokioTimer,
    VectorPdfBackend,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use host::{DirectoryDownloads, PrintedLinks};

#[derive(Parser, Debug)]
#[command(name = "certificate")]
#[command(version, about = "Render and hand off LabMetal assay certificates")]
struct Cli {
    /// Tool configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a record to PDF, PNG or JPEG
    Render(RenderArgs),
    /// Validate a layout table and print it
    Layout {
        #[arg(long)]
        layout: Option<PathBuf>,
    },
    /// Build the messaging deep link for a client
    Link {
        #[arg(long)]
        phone: String,
        #[arg(long)]
        record: Option<PathBuf>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Search the client directory
    Clients {
        #[arg(long)]
        directory: PathBuf,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// List the text runs of a rendered PDF by position
    Inspect {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Print the sample record as JSON
    Sample,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Record JSON, keyed by field name or form input id
    #[arg(long)]
    record: PathBuf,

    #[arg(long)]
    layout: Option<PathBuf>,

    /// Certificate artwork (PNG or JPEG)
    #[arg(long)]
    background: Option<PathBuf>,

    /// Output directory
    #[arg(long, default_value = ".")]
    out: PathBuf,

    #[arg(long, value_enum, default_value_t = Device::Desktop)]
    device: Device,

    /// Backend order, comma separated (overrides the configuration)
    #[arg(long, value_delimiter = ',')]
    backends: Vec<String>,

    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Also offer the result to this phone number
    #[arg(long)]
    phone: Option<String>,

    /// Recipient name (defaults to the record's client)
    #[arg(long)]
    name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Device {
    Desktop,
    Constrained,
}

impl From<Device> for DeviceClass {
    fn from(device: Device) -> Self {
        match device {
            Device::Desktop => DeviceClass::Desktop,
            Device::Constrained => DeviceClass::Constrained,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Png,
    Jpeg,
}

impl From<Format> for RasterFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Png => RasterFormat::Png,
            Format::Jpeg => RasterFormat::Jpeg,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<ToolConfig> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ToolConfig::from_json(&json).with_context(|| format!("invalid config {}", path.display()))
        }
        None => Ok(ToolConfig::default()),
    }
}

fn load_layout(path: Option<&Path>) -> Result<LayoutTable> {
    let layout = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading layout {}", path.display()))?;
            LayoutTable::from_json(&json).with_context(|| format!("invalid layout {}", path.display()))?
        }
        None => LayoutTable::labmetal_a4(),
    };
    layout.validate().context("layout failed validation")?;
    Ok(layout)
}

fn read_record(path: &Path) -> Result<CertificateRecord> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading record {}", path.display()))?;
    CertificateRecord::from_json(&json).with_context(|| format!("invalid record {}", path.display()))
}

async fn render(mut config: ToolConfig, args: RenderArgs) -> Result<()> {
    if !args.backends.is_empty() {
        config.render.backend_order = args.backends.clone();
    }
    if let Some(format) = args.format {
        config.render.raster_format = format.into();
    }
    let locale = config.locale;
    let layout = load_layout(args.layout.as_deref())?;
    let record = read_record(&args.record)?;

    let timer: Rc<dyn Timer> = Rc::new(TokioTimer);
    let mut selector = RenderStrategySelector::new(config.render.clone(), Rc::clone(&timer));
    selector.register(Rc::new(VectorPdfBackend::new()));
    selector.register(Rc::new(TemplateRasterBackend::new()));
    selector.register(Rc::new(SyntheticCanvasBackend::new()));
    let handoff = HandoffAdapter::new(
        &config,
        Rc::clone(&timer),
        Rc::new(DirectoryDownloads::new(&args.out)),
        Rc::new(PrintedLinks),
    );
    let session = CertificateSession::new(config, layout, selector, handoff, timer)
        .context("invalid configuration")?;

    if let Some(path) = &args.background {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading background {}", path.display()))?;
        session
            .set_background(bytes)
            .map_err(|e| anyhow!(e.user_message(locale)))?;
    }

    let capture = match session.capture(&record, None, args.device.into()).await {
        Ok(capture) => capture,
        Err(e @ SessionError::Render(RenderError::AllBackendsExhausted(_))) => {
            eprintln!("{}", e.user_message(locale));
            let report = session
                .text_fallback(&record)
                .await
                .map_err(|e| anyhow!(e.user_message(locale)))?;
            bail!("no backend produced a file; plain text written to {}", report.saved_to);
        }
        Err(e) => bail!(e.user_message(locale)),
    };
    for attempt in &capture.attempts {
        info!(backend = %attempt.backend, probes = attempt.probes, outcome = ?attempt.outcome, "attempt");
    }

    let report = match args.phone {
        Some(phone) => {
            let name = args
                .name
                .or_else(|| record.get(Field::Client).map(str::to_string))
                .unwrap_or_default();
            session.set_recipient(Some(ContactInfo {
                name,
                phone,
                company: None,
            }));
            session.share(&record).await
        }
        None => session.download(&record).await,
    }
    .map_err(|e| anyhow!(e.user_message(locale)))?;

    if let Some(notice) = &report.notice {
        eprintln!("{}", notice);
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn link(config: &ToolConfig, phone: &str, record: Option<&Path>, name: Option<String>) -> Result<String> {
    let record = match record {
        Some(path) => read_record(path)?,
        None => CertificateRecord::new(),
    };
    let contact = ContactInfo {
        name: name
            .or_else(|| record.get(Field::Client).map(str::to_string))
            .unwrap_or_default(),
        phone: phone.to_string(),
        company: None,
    };
    let phone = normalize_phone(phone, &config.messaging.country_prefix)
        .context("phone number is not usable")?;
    let message = format!(
        "{}\n\n{}",
        share_message(&record, Some(&contact), &config.lab_name, config.locale),
        manual_attach_note(config.locale)
    );
    Ok(deep_link(&config.messaging.base_url, &phone, &message))
}

fn clients(config: &ToolConfig, directory: &Path, query: &str) -> Result<()> {
    let json = std::fs::read_to_string(directory)
        .with_context(|| format!("reading directory {}", directory.display()))?;
    let directory = ClientDirectory::from_json(&json).context("invalid client directory")?;
    for (index, entry) in directory.filter(query, config.directory.max_matches) {
        println!(
            "{}\t{}\t{}\t{}",
            index,
            entry.name,
            entry.phone,
            entry.company.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn inspect(file: &Path, json: bool) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let placed = parse_placed_text(&bytes).with_context(|| format!("parsing {}", file.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&placed)?);
        return Ok(());
    }
    for run in placed {
        println!(
            "{}\t{:.1}\t{:.1}\t{}\t{:.1}\t{}",
            run.page, run.x_mm, run.y_mm, run.font, run.size_pt, run.text
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Render(args) => render(config, args).await?,
        Command::Layout { layout } => {
            let layout = load_layout(layout.as_deref())?;
            println!("{}", layout.to_json_pretty()?);
        }
        Command::Link {
            phone,
            record,
            name,
        } => println!("{}", link(&config, &phone, record.as_deref(), name)?),
        Command::Clients { directory, query } => clients(&config, &directory, &query)?,
        Command::Inspect { file, json } => inspect(&file, json)?,
        Command::Sample => {
            println!("{}", serde_json::to_string_pretty(&CertificateRecord::sample())?)
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_render_backends_split_on_commas() {
        let cli = Cli::try_parse_from([
            "certificate",
            "render",
            "--record",
            "r.json",
            "--backends",
            "template-raster,synthetic-canvas",
            "--device",
            "constrained",
        ])
        .unwrap();
        let Command::Render(args) = cli.command else {
            panic!("expected render");
        };
        assert_eq!(args.backends, vec!["template-raster", "synthetic-canvas"]);
        assert_eq!(DeviceClass::from(args.device), DeviceClass::Constrained);
        assert_eq!(args.out, PathBuf::from("."));
    }

    #[test]
    fn test_link_uses_prefix_and_attach_note() {
        let url = link(&ToolConfig::default(), "983 832 001", None, Some("Fernando".into())).unwrap();
        assert!(url.starts_with("https://wa.me/51983832001?text="));
        assert!(url.contains("Fernando"));
    }

    #[test]
    fn test_link_rejects_unusable_phone() {
        assert!(link(&ToolConfig::default(), "abc", None, None).is_err());
    }
}
