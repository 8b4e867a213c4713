use anyhow::{anyhow, Context, Result};
use asciiplay::{
    aiv, convert, AppConfig, CancelFlag, LiveFrameSource, Overrides, PlaybackOptions, PlaybackOutcome, Player,
    PlayerError, Resolution, TerminalSize,
};
use clap::{Parser, Subcommand};
use dialoguer::FuzzySelect;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;
use walkdir::WalkDir;

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a video file, URL or .aiv file in the terminal
    Play {
        /// Path or URL to play (prompted for when omitted)
        input: Option<String>,

        /// Play as fast as frames arrive
        #[arg(short, long, default_value_t = false)]
        ignore_fps: bool,

        /// Rescale the video to WIDTH x HEIGHT pixels (each pixel is two characters)
        #[arg(short, long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
        resolution: Option<Vec<usize>>,

        /// Override the frame rate found in the video
        #[arg(short, long)]
        fps: Option<f64>,

        /// Hide the progress bar
        #[arg(long, default_value_t = false)]
        no_progress: bool,

        /// Seconds without decoder output before playback gives up
        #[arg(long)]
        stall_timeout: Option<f64>,
    },

    /// Convert a PNG/JPEG image, or every image in a directory, to text
    Convert {
        /// Image file or directory (prompted for when omitted)
        path: Option<PathBuf>,

        /// Print to stdout instead of writing .txt files
        #[arg(short, long, default_value_t = false)]
        print: bool,

        /// Largest output in characters: WIDTH columns by HEIGHT rows
        #[arg(short, long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
        resolution: Option<Vec<u32>>,
    },

    /// Decode a video once into an .aiv file for later playback
    Encode {
        /// Path or URL to encode
        input: String,

        /// Output file (defaults to <input stem>.aiv)
        output: Option<PathBuf>,

        /// Rescale the video to WIDTH x HEIGHT pixels
        #[arg(short, long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
        resolution: Option<Vec<usize>>,

        /// Override the frame rate found in the video
        #[arg(short, long)]
        fps: Option<f64>,
    },
}

#[derive(Parser, Debug)]
#[command(version, about = "Plays video in the terminal using character art.")]
struct Args {
    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// The library error behind `err`, if it is one the user can fix.
fn user_facing(err: &anyhow::Error) -> Option<&PlayerError> {
    err.downcast_ref::<PlayerError>().filter(|e| e.is_user_facing())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = run(args);
    if let Some(err) = result.as_ref().err().and_then(user_facing) {
        eprintln!("Error: {}", err);
        process::exit(2);
    }
    result
}

fn run(args: Args) -> Result<()> {
    let cfg = AppConfig::load().context("loading config")?;

    match args.cmd {
        Command::Play {
            input,
            ignore_fps,
            resolution,
            fps,
            no_progress,
            stall_timeout,
        } => {
            let input = match input {
                Some(i) => i,
                None => pick_media_file(&["mp4", "mkv", "mov", "avi", "webm", "gif", "aiv"])?,
            };
            let cfg = match stall_timeout {
                Some(secs) => cfg.with_stall_timeout(Some(secs)),
                None => cfg,
            };
            let overrides = Overrides {
                resolution: resolution.map(|r| Resolution::new(r[0], r[1])),
                fps,
            };
            run_play(&input, &overrides, ignore_fps, !no_progress, &cfg)
        }
        Command::Convert { path, print, resolution } => {
            let path = match path {
                Some(p) => p,
                None => PathBuf::from(pick_media_file(&["png", "jpg", "jpeg"])?),
            };
            let (max_w, max_h) = match resolution {
                Some(r) => (r[0], r[1]),
                None => (cfg.image_max_width, cfg.image_max_height),
            };
            run_convert(&path, print, max_w, max_h)
        }
        Command::Encode {
            input,
            output,
            resolution,
            fps,
        } => {
            let output = output.unwrap_or_else(|| aiv::default_output_path(&input));
            let overrides = Overrides {
                resolution: resolution.map(|r| Resolution::new(r[0], r[1])),
                fps,
            };
            run_encode(&input, &output, &overrides, &cfg)
        }
    }
}

fn run_play(input: &str, overrides: &Overrides, ignore_fps: bool, show_progress: bool, cfg: &AppConfig) -> Result<()> {
    let cancel = CancelFlag::new();
    cancel.install_interrupt_handler()?;

    let options = PlaybackOptions::default()
        .with_ignore_fps(ignore_fps)
        .with_progress(show_progress && cfg.show_progress)
        .with_status(cfg.show_status);

    let stdout = io::stdout();
    let out = BufWriter::with_capacity(1 << 16, stdout.lock());
    let mut player = Player::new(out, options, TerminalSize::detect(), cancel);
    let summary = player
        .open_and_play(input, overrides, cfg)
        .with_context(|| format!("playing {}", input))?;

    if summary.outcome == PlaybackOutcome::Cancelled {
        tracing::info!("keyboard interrupt");
    }
    Ok(())
}

fn run_convert(path: &Path, print: bool, max_w: u32, max_h: u32) -> Result<()> {
    if path.is_file() {
        if print {
            let text = convert::image_to_string(path, max_w, max_h)?;
            io::stdout().write_all(text.as_bytes())?;
        } else {
            let out = convert::convert_image(path, max_w, max_h)?;
            println!("Created {}", out.display());
        }
        return Ok(());
    }

    if !path.is_dir() {
        return Err(anyhow!("Provide a valid path to an image or a directory: {}", path.display()));
    }

    if print {
        for img in convert::find_images(path) {
            println!("{}:", img.display());
            print!("{}", convert::image_to_string(&img, max_w, max_h)?);
            println!();
        }
        return Ok(());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")?
            .progress_chars("#>-"),
    );
    let written = convert::convert_directory(path, max_w, max_h, |progress| {
        pb.set_length(progress.total as u64);
        pb.set_position(progress.completed as u64);
    })?;
    pb.finish_with_message("Done");

    for out in &written {
        println!("Created {}", out.display());
    }
    Ok(())
}

fn run_encode(input: &str, output: &Path, overrides: &Overrides, cfg: &AppConfig) -> Result<()> {
    asciiplay::source::check_input(input)?;
    let cancel = CancelFlag::new();
    cancel.install_interrupt_handler()?;

    let mut source = LiveFrameSource::open(input, overrides, TerminalSize::detect(), cfg)
        .with_context(|| format!("opening {}", input))?;
    let frames = aiv::encode_aiv(&mut source, output, &cancel)
        .with_context(|| format!("writing {}", output.display()))?;

    if cancel.is_cancelled() {
        println!("Encoding interrupted after {} frames: {}", frames, output.display());
    } else {
        println!("Encoded {} frames to {}", frames, output.display());
    }
    Ok(())
}

fn find_media_files(extensions: &[&str]) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(".")
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| extensions.iter().any(|x| ext.eq_ignore_ascii_case(x)))
        })
        .filter_map(|e| e.path().to_str().map(str::to_string))
        .collect();
    files.sort();
    files
}

fn pick_media_file(extensions: &[&str]) -> Result<String> {
    if !io::stdin().is_terminal() {
        return Err(anyhow!("No input given."));
    }
    let mut files = find_media_files(extensions);
    if files.is_empty() {
        return Err(anyhow!("No media files found in current directory."));
    }
    let selection = FuzzySelect::with_theme(&dialoguer::theme::ColorfulTheme::default())
        .with_prompt("Choose an input file")
        .default(0)
        .items(&files)
        .interact()?;
    Ok(files.swap_remove(selection))
}
