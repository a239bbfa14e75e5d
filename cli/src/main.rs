mod atomic_write;
mod config;

use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use chatmark_protocol::send::finalize;
use chatmark_render::Composer;
use chatmark_render::PendingPlaceholder;
use chatmark_render::PendingTicker;
use chatmark_render::RenderSettings;
use chatmark_render::render_message_text;
use chatmark_render::set_code_theme;
use clap::Parser;
use clap::Subcommand;
use tokio::io::AsyncReadExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::atomic_write::write_atomic_text;
use crate::config::ConfigStore;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Render chat message text to display-safe HTML and prepare it for sending"
)]
struct Cli {
    /// Config file to read instead of `~/.chatmark/config.toml`.
    #[arg(long, global = true, env = "CHATMARK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Render message text (from FILE or stdin) to an HTML fragment.
    Render {
        file: Option<PathBuf>,

        /// Placeholder phase shown when the text is empty.
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=3))]
        pending_phase: u8,
    },
    /// Append an inline tag for IMAGE to a composition buffer.
    ///
    /// Without `--buffer` the new buffer is printed.
    Attach {
        image: PathBuf,

        #[arg(long)]
        buffer: Option<PathBuf>,
    },
    /// Print the transmit-ready form of a composed message (from FILE or stdin).
    Send { file: Option<PathBuf> },
    /// Show the pending placeholder animation for a number of ticks.
    Pending {
        #[arg(long, default_value = "3")]
        ticks: NonZeroUsize,
    },
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let store = match cli.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::new_default()?,
    };
    let settings = store.load_settings().context("load chatmark config")?;
    set_code_theme(settings.code_theme);

    match cli.command {
        CliCommand::Render {
            file,
            pending_phase,
        } => {
            let text = read_input(file.as_deref()).await?;
            let pending = PendingPlaceholder::from_dot_count(usize::from(pending_phase));
            print!("{}", render_message_text(&text, pending));
        }
        CliCommand::Attach { image, buffer } => run_attach(&settings, &image, buffer.as_deref()).await?,
        CliCommand::Send { file } => {
            let text = read_input(file.as_deref()).await?;
            print!("{}", finalize(&text));
        }
        CliCommand::Pending { ticks } => run_pending(&settings, ticks).await?,
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHATMARK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("read {}", path.display())),
        None => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .context("read stdin")?;
            Ok(text)
        }
    }
}

async fn run_attach(
    settings: &RenderSettings,
    image: &Path,
    buffer: Option<&Path>,
) -> anyhow::Result<()> {
    let existing = match buffer {
        Some(path) => match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("read {}", path.display())));
            }
        },
        None => String::new(),
    };

    let mut composer = Composer::with_text(settings.encoder(), existing);
    composer.select_image(image);
    if !composer.wait_for_attachment().await {
        anyhow::bail!("could not attach {}", image.display());
    }

    match buffer {
        Some(path) => write_atomic_text(path, composer.text())?,
        None => println!("{}", composer.text()),
    }
    Ok(())
}

async fn run_pending(settings: &RenderSettings, ticks: NonZeroUsize) -> anyhow::Result<()> {
    let (ticker, mut phases) = PendingTicker::start(settings.pending_period);
    let mut phase = *phases.borrow_and_update();
    for tick in 0..ticks.get() {
        if tick > 0 {
            phases
                .changed()
                .await
                .context("pending ticker stopped early")?;
            phase = *phases.borrow_and_update();
        }
        print!("{}", render_message_text("", phase));
    }
    ticker.cancel().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pending_phase_is_range_checked() {
        assert!(Cli::try_parse_from(["chatmark", "render", "--pending-phase", "4"]).is_err());
        let cli = Cli::try_parse_from(["chatmark", "render", "--pending-phase", "3", "msg.md"])
            .expect("parse");
        match cli.command {
            CliCommand::Render {
                file,
                pending_phase,
            } => {
                assert_eq!(file, Some(PathBuf::from("msg.md")));
                assert_eq!(pending_phase, 3);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn attach_writes_dual_tag_into_buffer_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image_path = dir.path().join("dot.png");
        image::RgbImage::new(1, 1)
            .save(&image_path)
            .expect("write png");
        let buffer = dir.path().join("draft.txt");
        std::fs::write(&buffer, "hello ").expect("write buffer");

        run_attach(&RenderSettings::default(), &image_path, Some(&buffer))
            .await
            .expect("attach");

        let text = std::fs::read_to_string(&buffer).expect("read buffer");
        assert!(text.starts_with(r#"hello <img src="data:image/png;base64,"#), "{text}");
        assert!(
            text.ends_with(
                r#"alt="dot.png" width="1" height="1" data-original-width="1" data-original-height="1">"#
            ),
            "{text}"
        );
    }

    #[tokio::test]
    async fn failed_attach_leaves_buffer_file_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let image_path = dir.path().join("bogus.png");
        std::fs::write(&image_path, b"nope").expect("write bogus");
        let buffer = dir.path().join("draft.txt");
        std::fs::write(&buffer, "keep me").expect("write buffer");

        assert!(
            run_attach(&RenderSettings::default(), &image_path, Some(&buffer))
                .await
                .is_err()
        );
        assert_eq!(std::fs::read_to_string(&buffer).expect("read"), "keep me");
    }
}
