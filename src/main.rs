use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use base64::Engine;
use sensor_gallery::gallery::RedescribeStatus;
use sensor_gallery::{logging, Config, ExportFormat, Gallery, OnnxDetector, UploadRequest};

enum Command {
    Ingest(PathBuf),
    Add {
        image: PathBuf,
        sensor: String,
        map: Option<String>,
        name: Option<String>,
    },
    List,
    Sensor(i64),
    Delete(i64),
    Fetch { filename: String, out: Option<PathBuf> },
    Redescribe,
    Export { path: PathBuf, format: ExportFormat },
}

struct Args {
    config_path: Option<PathBuf>,
    command: Command,
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_help();
    std::process::exit(1);
}

fn flag_value(args: &[String], i: &mut usize, flag: &str) -> String {
    if *i + 1 < args.len() {
        *i += 1;
        args[*i].clone()
    } else {
        usage_error(&format!("{} requires an argument", flag));
    }
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut positional: Vec<String> = Vec::new();
    let mut sensor = None;
    let mut map = None;
    let mut name = None;
    let mut out = None;
    let mut format = ExportFormat::Csv;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("sensor-gallery {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                config_path = Some(PathBuf::from(flag_value(&args, &mut i, "--config")))
            }
            "--sensor" => sensor = Some(flag_value(&args, &mut i, "--sensor")),
            "--map" => map = Some(flag_value(&args, &mut i, "--map")),
            "--name" => name = Some(flag_value(&args, &mut i, "--name")),
            "--out" | "-o" => out = Some(PathBuf::from(flag_value(&args, &mut i, "--out"))),
            "--format" => {
                format = flag_value(&args, &mut i, "--format")
                    .parse()
                    .unwrap_or_else(|e: sensor_gallery::GalleryError| usage_error(&e.to_string()))
            }
            arg if arg.starts_with('-') => usage_error(&format!("unknown argument: {}", arg)),
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let id = |arg: Option<&String>| -> i64 {
        match arg.map(|s| s.parse::<i64>()) {
            Some(Ok(id)) => id,
            _ => usage_error("expected a numeric photo id"),
        }
    };

    let mut rest = positional.iter();
    let command = match rest.next().map(String::as_str) {
        Some("ingest") => match rest.next() {
            Some(path) => Command::Ingest(PathBuf::from(path)),
            None => usage_error("ingest requires a request file"),
        },
        Some("add") => {
            let image = match rest.next() {
                Some(path) => PathBuf::from(path),
                None => usage_error("add requires an image path"),
            };
            let sensor = sensor.unwrap_or_else(|| usage_error("add requires --sensor"));
            Command::Add {
                image,
                sensor,
                map,
                name,
            }
        }
        Some("list") => Command::List,
        Some("sensor") => Command::Sensor(id(rest.next())),
        Some("delete") => Command::Delete(id(rest.next())),
        Some("fetch") => match rest.next() {
            Some(filename) => Command::Fetch {
                filename: filename.clone(),
                out,
            },
            None => usage_error("fetch requires a filename"),
        },
        Some("redescribe") => Command::Redescribe,
        Some("export") => match rest.next() {
            Some(path) => Command::Export {
                path: PathBuf::from(path),
                format,
            },
            None => usage_error("export requires an output path"),
        },
        Some(other) => usage_error(&format!("unknown command: {}", other)),
        None => usage_error("no command given"),
    };

    if let Some(extra) = rest.next() {
        usage_error(&format!("unexpected argument: {}", extra));
    }

    Args {
        config_path,
        command,
    }
}

fn print_help() {
    println!(
        r#"sensor-gallery - ingest and annotate sensor-tagged photos

USAGE:
    sensor-gallery [OPTIONS] <COMMAND>

COMMANDS:
    ingest REQUEST.json                 Ingest an upload (fields: raw, filename, sensor, map)
    add IMAGE --sensor DATA [--map DATA] [--name FILENAME]
                                        Ingest a local image file
    list                                List the gallery as JSON
    sensor ID                           Show the sensor reading of a photo
    delete ID                           Delete a photo, its readings and its file
    fetch FILENAME [--out PATH]         Copy a stored photo to PATH (or stdout)
    redescribe                          Run detection again on every photo
    export PATH [--format csv|json]     Export the gallery

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    SENSOR_GALLERY_CONFIG   Path to config file (overrides default location)
    SENSOR_GALLERY_LOG      Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/sensor-gallery/config.toml"#
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let config = match args.config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    // Fetch the model up front rather than failing the first upload
    if matches!(
        args.command,
        Command::Ingest(_) | Command::Add { .. } | Command::Redescribe
    ) {
        let model = OnnxDetector::new(config.detector.clone()).ensure_model()?;
        tracing::info!(model = ?model, "Detection model ready");
    }

    let gallery = Arc::new(Gallery::open(config)?);

    match args.command {
        Command::Ingest(request_path) => {
            let body = std::fs::read_to_string(&request_path)
                .with_context(|| format!("Failed to read {}", request_path.display()))?;
            let request: UploadRequest = serde_json::from_str(&body)
                .with_context(|| format!("Invalid upload request {}", request_path.display()))?;
            let photo = gallery
                .ingest_offloaded(request.raw, request.filename, request.sensor, request.map)
                .await?;
            print_json(&photo)?;
        }
        Command::Add {
            image,
            sensor,
            map,
            name,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("Failed to read {}", image.display()))?;
            let filename = match name {
                Some(name) => name,
                None => image
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("image path has no file name")?,
            };
            let raw = base64::engine::general_purpose::STANDARD.encode(bytes);
            let photo = gallery
                .ingest_offloaded(raw, filename, sensor, map)
                .await?;
            print_json(&photo)?;
        }
        Command::List => print_json(&gallery.list_gallery()?)?,
        Command::Sensor(id) => print_json(&gallery.get_sensor_reading(id)?)?,
        Command::Delete(id) => {
            let gallery = Arc::clone(&gallery);
            if tokio::task::spawn_blocking(move || gallery.delete_photo(id)).await?? {
                println!("Deleted photo {}", id);
            } else {
                bail!("photo {} not found", id);
            }
        }
        Command::Fetch { filename, out } => {
            let mut file = gallery.fetch_file(&filename)?;
            match out {
                Some(path) => {
                    let mut dest = std::fs::File::create(&path)
                        .with_context(|| format!("Failed to create {}", path.display()))?;
                    std::io::copy(&mut file, &mut dest)?;
                }
                None => {
                    std::io::copy(&mut file, &mut std::io::stdout().lock())?;
                }
            }
        }
        Command::Redescribe => {
            let (tx, rx) = mpsc::channel();
            let worker = Arc::clone(&gallery);
            let handle = tokio::task::spawn_blocking(move || worker.redescribe_all(Some(tx)));

            for status in rx {
                match status {
                    RedescribeStatus::Starting { total_photos } => {
                        eprintln!("Re-describing {} photos", total_photos)
                    }
                    RedescribeStatus::Processing {
                        current,
                        total,
                        filename,
                    } => eprintln!("[{}/{}] {}", current, total, filename),
                    RedescribeStatus::Error { photo_id, message } => {
                        eprintln!("photo {}: {}", photo_id, message)
                    }
                    RedescribeStatus::Described { .. } | RedescribeStatus::Completed { .. } => {}
                }
            }

            let report = handle.await??;
            println!(
                "Updated {} photos, {} failed",
                report.updated,
                report.failures.len()
            );
        }
        Command::Export { path, format } => {
            let count = gallery.export(&path, format)?;
            println!("Exported {} photos to {}", count, path.display());
        }
    }

    Ok(())
}
