mod config;

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use liblpr::{
    ClientConfig, ErrorMode, Identity, JobKey, LpdClient, PrintMode, QueueFormat, SystemIdentity,
    TextOptions,
};

/// lprc - talk to remote line printer daemons (RFC 1179)
#[derive(Parser, Debug)]
#[command(name = "lprc", version, about)]
struct Cli {
    /// Printer host
    #[arg(short = 'H', long, global = true)]
    host: Option<String>,

    /// Daemon port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Queue name
    #[arg(short = 'P', long, global = true)]
    queue: Option<String>,

    /// Connect from a reserved source port (721-731, usually needs root)
    #[arg(long, global = true)]
    strict_ports: bool,

    /// Config file instead of ~/.config/lprc/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send files to the queue, one job per file
    Print {
        /// How the daemon should treat the data
        #[arg(short, long, value_enum, default_value_t = ModeArg::Text)]
        mode: ModeArg,

        /// Page header title (pr mode)
        #[arg(short = 'T', long)]
        title: Option<String>,

        /// Page width in columns (text and pr modes)
        #[arg(short = 'w', long)]
        width: Option<u32>,

        /// Indentation in columns (text mode)
        #[arg(short = 'i', long)]
        indent: Option<u32>,

        /// Job name on the banner page (default: file name)
        #[arg(short = 'J', long)]
        job_name: Option<String>,

        /// Class name on the banner page
        #[arg(short = 'C', long)]
        class: Option<String>,

        /// Print a banner page
        #[arg(long)]
        banner: bool,

        /// Mail this user when the job is done
        #[arg(long)]
        mail: Option<String>,

        /// Files to print
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the queue
    Queue {
        /// Long listing
        #[arg(short, long)]
        long: bool,

        /// Only these users or job numbers
        items: Vec<String>,
    },

    /// Remove jobs from the queue
    Remove {
        /// User on whose behalf jobs are removed (default: current user)
        #[arg(long)]
        agent: Option<String>,

        /// Users or job numbers to remove
        #[arg(required = true)]
        items: Vec<String>,
    },

    /// Start printing any waiting jobs
    Start,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Text,
    /// Text with control characters passed through
    Raw,
    Pr,
    Postscript,
    Dvi,
    Cif,
    Plot,
    Ditroff,
    Fortran,
    Troff,
    Raster,
}

/// Options for `lprc print`
#[derive(Debug)]
struct PrintOptions {
    mode: ModeArg,
    title: Option<String>,
    width: Option<u32>,
    indent: Option<u32>,
    job_name: Option<String>,
    class: Option<String>,
    banner: bool,
    mail: Option<String>,
}

impl PrintOptions {
    fn print_mode(&self) -> PrintMode {
        let text = |no_filter| {
            PrintMode::Text(TextOptions {
                width: self.width,
                indent: self.indent,
                no_filter,
            })
        };
        match self.mode {
            ModeArg::Text => text(false),
            ModeArg::Raw => text(true),
            ModeArg::Pr => PrintMode::Pr {
                title: self.title.clone(),
                width: self.width,
            },
            ModeArg::Postscript => PrintMode::PostScript,
            ModeArg::Dvi => PrintMode::Dvi,
            ModeArg::Cif => PrintMode::Cif,
            ModeArg::Plot => PrintMode::Plot,
            ModeArg::Ditroff => PrintMode::Ditroff,
            ModeArg::Fortran => PrintMode::Fortran,
            ModeArg::Troff => PrintMode::Troff,
            ModeArg::Raster => PrintMode::Raster,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn init_logging() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("lprc=info".parse()?)
                .add_directive("liblpr=info".parse()?),
        )
        .init();
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_logging()?;

    let config = Config::load(cli.config.as_deref());
    let client_config = client_config(config.client.clone(), cli.port, cli.strict_ports);
    let host = cli
        .host
        .or(config.host.clone())
        .ok_or("no printer host given (use --host or set `host` in the config file)")?;
    let queue = cli.queue.unwrap_or_else(|| config.queue.clone());
    info!(%host, %queue, port = client_config.port, "Using printer");

    let client = LpdClient::new(client_config);
    match cli.command {
        Command::Print {
            mode,
            title,
            width,
            indent,
            job_name,
            class,
            banner,
            mail,
            files,
        } => {
            let opts = PrintOptions {
                mode,
                title,
                width,
                indent,
                job_name,
                class,
                banner,
                mail,
            };
            cmd_print(&client, &host, &queue, &opts, &files)
        }
        Command::Queue { long, items } => cmd_queue(&client, &host, &queue, long, &items),
        Command::Remove { agent, items } => {
            let agent = agent.unwrap_or_else(|| SystemIdentity.effective_username());
            cmd_remove(&client, &host, &queue, &agent, &items)
        }
        Command::Start => {
            client.connect(&host)?;
            client.print_waiting_jobs(&queue)?;
            println!("{queue}: printing started");
            Ok(())
        }
    }
}

/// Apply command-line overrides. Failures always come back as errors so
/// they end in exit code 1, whatever `error_mode` the config file asks for.
fn client_config(mut client: ClientConfig, port: Option<u16>, strict_ports: bool) -> ClientConfig {
    if let Some(port) = port {
        client.port = port;
    }
    if strict_ports {
        client.strict_rfc_ports = true;
    }
    client.error_mode = ErrorMode::Return;
    client
}

fn cmd_print(
    client: &LpdClient,
    host: &str,
    queue: &str,
    opts: &PrintOptions,
    files: &[PathBuf],
) -> Result<(), Box<dyn Error>> {
    // read everything up front so a bad path fails before any job is sent
    let documents = files
        .iter()
        .map(|path| {
            std::fs::read(path)
                .map(|data| (path.as_path(), data))
                .map_err(|e| format!("{}: {e}", path.display()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    client.connect(host)?;
    client.send_jobs(queue)?;
    for (path, data) in documents {
        let key = submit(client, opts, path, &data)?;
        println!("{}: queued as job {}", path.display(), client.job_id(key)?);
    }
    client.disconnect()?;
    Ok(())
}

/// Describe, then send, one file as a job
fn submit(
    client: &LpdClient,
    opts: &PrintOptions,
    path: &Path,
    data: &[u8],
) -> liblpr::Result<JobKey> {
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

    let key = client.new_job()?;
    client.set_print_mode(key, opts.print_mode())?;
    client.set_source_filename(key, &name)?;
    client.set_job_name(key, opts.job_name.as_deref().unwrap_or(&name))?;
    if let Some(class) = &opts.class {
        client.set_banner_class(key, class)?;
    }
    if opts.banner {
        client.enable_banner(key, &SystemIdentity.effective_username())?;
    }
    if let Some(user) = &opts.mail {
        client.set_mail_user(key, user)?;
    }
    client.send_control_file(key)?;
    client.send_data_sized(key, data, data.len() as u64)?;
    info!(file = %path.display(), bytes = data.len(), "Job sent");
    Ok(key)
}

fn cmd_queue(
    client: &LpdClient,
    host: &str,
    queue: &str,
    long: bool,
    items: &[String],
) -> Result<(), Box<dyn Error>> {
    let format = if long {
        QueueFormat::Long
    } else {
        QueueFormat::Short
    };
    let items: Vec<&str> = items.iter().map(String::as_str).collect();
    client.connect(host)?;
    for line in client.get_queue_state(queue, format, &items)? {
        println!("{line}");
    }
    Ok(())
}

fn cmd_remove(
    client: &LpdClient,
    host: &str,
    queue: &str,
    agent: &str,
    items: &[String],
) -> Result<(), Box<dyn Error>> {
    let items: Vec<&str> = items.iter().map(String::as_str).collect();
    client.connect(host)?;
    client.remove_jobs(queue, agent, &items)?;
    println!("{queue}: removal requested for {}", items.join(" "));
    Ok(())
}
