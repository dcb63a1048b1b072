//! `trifactor` — command-line client for the Trifactor verification daemon.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[zbus::proxy(
    interface = "org.freedesktop.Trifactor1",
    default_service = "org.freedesktop.Trifactor1",
    default_path = "/org/freedesktop/Trifactor1"
)]
trait Trifactor {
    async fn enroll(
        &self,
        user: &str,
        modality: &str,
        payload: Vec<u8>,
        rotation_degrees: i32,
    ) -> zbus::Result<String>;

    async fn verify(
        &self,
        user: &str,
        face_probe: Vec<u8>,
        palm_probe: Vec<u8>,
        voice_probe: Vec<u8>,
        secondary_factor_passed: bool,
    ) -> zbus::Result<String>;

    async fn arm_capture(&self) -> zbus::Result<()>;

    async fn cancel_capture(&self) -> zbus::Result<()>;

    async fn submit_landmark_frame(
        &self,
        left_present: bool,
        left_eye_open: f64,
        right_present: bool,
        right_eye_open: f64,
    ) -> zbus::Result<bool>;

    async fn status(&self) -> zbus::Result<String>;

    async fn remove_enrollment(&self, user: &str) -> zbus::Result<u64>;
}

#[derive(Parser)]
#[command(name = "trifactor", about = "Multi-factor biometric verification client")]
struct Cli {
    /// Connect to the session bus instead of the system bus (development mode).
    #[arg(long, global = true)]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enroll a reference sample for a user.
    Enroll {
        user: String,
        /// Modality: face, palm or voice.
        modality: String,
        /// Path to the reference payload (feature vector, or WAV for voice).
        file: PathBuf,
        /// Residual rotation in degrees left on the sample by the capture layer.
        #[arg(long, default_value_t = 0)]
        rotation: i32,
    },
    /// Run the full sequential verification pipeline.
    Verify {
        user: String,
        /// Path to the face probe payload.
        #[arg(long)]
        face: PathBuf,
        /// Path to the palm probe payload.
        #[arg(long)]
        palm: PathBuf,
        /// Path to the voice probe payload.
        #[arg(long)]
        voice: PathBuf,
        /// Assert that the device-level credential check passed.
        #[arg(long)]
        secondary_passed: bool,
    },
    /// Arm the blink gate and stream a scripted blink (diagnostics).
    TestBlink,
    /// Show daemon status.
    Status,
    /// Remove every enrolled reference for a user.
    Remove { user: String },
}

async fn connect(session: bool) -> Result<TrifactorProxy<'static>> {
    tracing::debug!(session, "connecting to trifactord");
    let conn = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus — is trifactord running?")?;
    Ok(TrifactorProxy::new(&conn).await?)
}

fn read_payload(path: &PathBuf) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Pretty-print a JSON reply from the daemon, falling back to raw text.
fn print_json(raw: &str) {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default()),
        Err(_) => println!("{raw}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let proxy = connect(cli.session).await?;

    match cli.command {
        Command::Enroll {
            user,
            modality,
            file,
            rotation,
        } => {
            let payload = read_payload(&file)?;
            let digest = proxy.enroll(&user, &modality, payload, rotation).await?;
            println!("enrolled {modality} for {user} (sha256 {digest})");
        }
        Command::Verify {
            user,
            face,
            palm,
            voice,
            secondary_passed,
        } => {
            let outcome = proxy
                .verify(
                    &user,
                    read_payload(&face)?,
                    read_payload(&palm)?,
                    read_payload(&voice)?,
                    secondary_passed,
                )
                .await?;
            print_json(&outcome);

            let verified = serde_json::from_str::<serde_json::Value>(&outcome)
                .ok()
                .and_then(|v| v["verified"].as_bool())
                .unwrap_or(false);
            std::process::exit(if verified { 0 } else { 1 });
        }
        Command::TestBlink => {
            proxy.arm_capture().await?;
            println!("gate armed; submitting open → closed frames");

            // Open eyes, then a blink.
            let open = proxy.submit_landmark_frame(true, 0.95, true, 0.95).await?;
            let blink = proxy.submit_landmark_frame(true, 0.1, true, 0.1).await?;
            println!("open frame fired: {open}");
            println!("blink frame fired: {blink}");

            if !blink {
                proxy.cancel_capture().await?;
                anyhow::bail!("blink frame did not authorize a capture");
            }
        }
        Command::Status => {
            let status = proxy.status().await?;
            print_json(&status);
        }
        Command::Remove { user } => {
            let removed = proxy.remove_enrollment(&user).await?;
            println!("removed {removed} reference(s) for {user}");
        }
    }

    Ok(())
}
