use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use rpi_headless::boot::{self, Mode};
use rpi_headless::config::{
    self, HdmiSection, Profile, ProfileOptions, Settings, SshSection, VncSection, WifiSection,
};
use rpi_headless::firstrun::DEFAULT_DEVICE_BOOT_PATH;
use rpi_headless::{Error, ErrorKind, Result};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Boot partition to edit (auto-detected when omitted)
    #[arg(long, global = true)]
    boot: Option<PathBuf>,
    /// Change the Raspberry Pi this runs on instead of a mounted card
    #[arg(long, global = true)]
    live: bool,
    /// Where the boot partition is mounted on the Pi itself [default: /boot/firmware]
    #[arg(long, global = true)]
    device_boot_path: Option<String>,
    /// Report what would change without writing anything
    #[arg(long, global = true)]
    dry_run: bool,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write wpa_supplicant.conf for one network
    Wifi {
        #[arg(long)]
        ssid: String,
        /// File whose first line is the passphrase (prompted when omitted)
        #[arg(long, conflicts_with = "open")]
        password_file: Option<PathBuf>,
        /// Network without a passphrase
        #[arg(long)]
        open: bool,
        /// ISO 3166 alpha-2 regulatory country, e.g. GB
        #[arg(long)]
        country: String,
        /// The network does not broadcast its SSID
        #[arg(long)]
        hidden: bool,
        /// Store the passphrase itself instead of the derived key
        #[arg(long)]
        plain_psk: bool,
        /// Destination on a live system [default: /etc/wpa_supplicant/wpa_supplicant.conf]
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Enable or disable SSH, optionally creating the first user
    Ssh {
        #[arg(long)]
        disable: bool,
        /// First user to create (written to userconf.txt)
        #[arg(long)]
        user: Option<String>,
        /// File whose first line is the user's password (prompted when omitted)
        #[arg(long, requires = "user")]
        password_file: Option<PathBuf>,
    },
    /// Enable or disable the RealVNC server
    Vnc {
        #[arg(long)]
        disable: bool,
    },
    /// Set the HDMI output mode in config.txt
    Hdmi {
        /// `0` for auto-detect or GROUP/MODE, e.g. `2/82` for 1920x1080 DMT
        #[arg(long)]
        resolution: String,
    },
    /// Apply every section of a profile TOML
    Apply {
        profile: PathBuf,
    },
    /// Print a profile after resolving extends/imports
    Resolve {
        profile: PathBuf,
    },
    /// Show what the boot partition currently configures
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.log_json);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            debug!(kind = ?e.kind(), "command failed");
            match e.kind() {
                ErrorKind::Failed => eprintln!("aborted: {e}"),
                ErrorKind::Usage | ErrorKind::Precondition => eprintln!("error: {e}"),
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(args: Args) -> Result<()> {
    let Args {
        boot,
        live,
        device_boot_path,
        dry_run,
        cmd,
        ..
    } = args;

    let mut opts = ProfileOptions {
        boot,
        mode: if live { Mode::Live } else { Mode::Card },
        device_boot_path: device_boot_path
            .clone()
            .unwrap_or_else(|| DEFAULT_DEVICE_BOOT_PATH.into()),
        dry_run,
    };

    let settings = match cmd {
        Command::Resolve { profile } => return cmd_resolve(&profile),
        Command::Status { json } => return cmd_status(&opts, json),
        Command::Apply { profile } => {
            let doc = config::load(&profile)?;
            let loaded = Profile::from_doc(&doc)?;
            // Command-line flags win over the profile.
            opts = ProfileOptions {
                boot: opts.boot.or(loaded.options.boot),
                mode: if live {
                    Mode::Live
                } else {
                    loaded.options.mode
                },
                device_boot_path: device_boot_path.unwrap_or(loaded.options.device_boot_path),
                dry_run: dry_run || loaded.options.dry_run,
            };
            loaded.settings
        }
        Command::Wifi {
            ssid,
            password_file,
            open,
            country,
            hidden,
            plain_psk,
            path,
        } => Settings {
            wifi: Some(
                WifiSection {
                    ssid,
                    password_file: password_file.map(|p| p.display().to_string()),
                    open,
                    country,
                    hidden,
                    plain_psk,
                    path: path.map(|p| p.display().to_string()),
                }
                .into_settings()?,
            ),
            ..Default::default()
        },
        Command::Ssh {
            disable,
            user,
            password_file,
        } => Settings {
            ssh: Some(
                SshSection {
                    enabled: !disable,
                    user,
                    password_file: password_file.map(|p| p.display().to_string()),
                }
                .into_settings()?,
            ),
            ..Default::default()
        },
        Command::Vnc { disable } => Settings {
            vnc: Some(VncSection { enabled: !disable }.into_settings()),
            ..Default::default()
        },
        Command::Hdmi { resolution } => Settings {
            hdmi: Some(HdmiSection { resolution }.into_settings()?),
            ..Default::default()
        },
    };

    rpi_headless::executor::run(&opts, &settings)
}

fn cmd_resolve(path: &Path) -> Result<()> {
    let doc = config::load(path)?;
    let s = toml::to_string_pretty(&doc.value)
        .map_err(|e| Error::msg(format!("failed to render profile: {e}")))?;
    print!("{s}");
    Ok(())
}

fn cmd_status(opts: &ProfileOptions, json: bool) -> Result<()> {
    let bp = boot::locate(opts.boot.as_deref(), opts.mode)?;
    let report = rpi_headless::status::collect(&bp, opts.mode, &opts.device_boot_path)?;
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_text());
    }
    Ok(())
}
