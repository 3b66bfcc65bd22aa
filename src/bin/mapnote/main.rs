use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser as CliParser, Subcommand};
use log::info;
use mapnote::Session;
use mapnote::config::Config;
use mapnote::map::editor::{DisplayUnit, editable_fields};
use mapnote::parser::{export_geojson, import_geojson};
use mapnote::persistence::{
  InMemoryAnswers, LogNotifier, PersistenceBridge, SaveOutcome, SavedDocument,
};
use mapnote::remote::HttpFileApi;

#[derive(clap::Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// Url of the document server. Overrides the config.
  #[arg(short, long)]
  server: Option<String>,

  /// User to act as. Overrides the config.
  #[arg(short, long)]
  user: Option<String>,

  /// Role to send, teacher or admin unlock the admin commands.
  #[arg(short, long)]
  role: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Lists the stored documents.
  List {
    /// Lists the documents of every user. Needs an admin role.
    #[arg(short, long)]
    all: bool,
  },
  /// Prints the shapes of a stored document.
  Show {
    file_name: String,
    /// Shows measurements in kilometers.
    #[arg(short, long)]
    km: bool,
  },
  /// Writes a stored document as a GeoJSON FeatureCollection.
  Export {
    file_name: String,
    /// Output file. stdout is used if this is not provided.
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Reads a local GeoJSON or saved document and stores it on the server.
  Upload {
    path: PathBuf,
    /// Name to store it under. Defaults to the file stem.
    #[arg(short, long)]
    name: Option<String>,
  },
  /// Deletes a stored document.
  Delete { file_name: String },
  /// Prints the shapes of a local GeoJSON or saved document.
  Measure {
    path: PathBuf,
    #[arg(short, long)]
    km: bool,
  },
}

type Bridge = PersistenceBridge<HttpFileApi>;

fn bridge(config: &Config) -> Bridge {
  PersistenceBridge::from_config(
    HttpFileApi::from_config(config),
    Box::new(InMemoryAnswers::default()),
    Box::new(LogNotifier),
    config,
  )
}

fn read_local(session: &mut Session, path: &Path) -> Result<()> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
  let document = serde_json::from_str(&content)?;
  let (collection, _) = SavedDocument::classify(document)?.into_parts();
  let report = import_geojson(session, &collection)?;
  info!(
    "Read {} shapes from {}, skipped {}",
    report.imported,
    path.display(),
    report.skipped
  );
  Ok(())
}

fn print_shapes(session: &Session, km: bool) {
  let unit = if km {
    DisplayUnit::Kilometers
  } else {
    DisplayUnit::Meters
  };
  for (id, shape) in session.shapes().iter() {
    let fields = editable_fields(shape, unit);
    match fields.measurement_text() {
      Some(measurement) => println!("{id}\t{:?}\t{}\t{measurement}", shape.kind(), fields.name),
      None => println!("{id}\t{:?}\t{}", shape.kind(), fields.name),
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  env_logger::init();
  let args = Args::parse();

  let mut config = Config::new();
  if args.server.is_some() {
    config.server_url = args.server;
  }
  if args.user.is_some() {
    config.user = args.user;
  }
  if args.role.is_some() {
    config.role = args.role;
  }

  let mut session = Session::from_config(&config);
  session.attach_map(config.map_view);

  match args.command {
    Command::List { all: false } => {
      for file_name in bridge(&config).list().await? {
        println!("{file_name}");
      }
    }
    Command::List { all: true } => {
      for (user, file_name) in HttpFileApi::from_config(&config)
        .list_all_documents()
        .await?
      {
        println!("{user}\t{file_name}");
      }
    }
    Command::Show { file_name, km } => {
      bridge(&config).load(&mut session, &file_name).await?;
      print_shapes(&session, km);
    }
    Command::Export { file_name, output } => {
      bridge(&config).load(&mut session, &file_name).await?;
      let exported = serde_json::to_string_pretty(&export_geojson(&session))?;
      match output {
        Some(path) => std::fs::write(&path, exported)
          .with_context(|| format!("cannot write {}", path.display()))?,
        None => writeln!(std::io::stdout(), "{exported}")?,
      }
    }
    Command::Upload { path, name } => {
      read_local(&mut session, &path)?;
      let name = name
        .or_else(|| {
          path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
        })
        .context("no file name given")?;
      if bridge(&config).save_now(&session, &name).await? == SaveOutcome::Busy {
        bail!("another save is in progress");
      }
    }
    Command::Delete { file_name } => bridge(&config).delete(&file_name).await?,
    Command::Measure { path, km } => {
      read_local(&mut session, &path)?;
      print_shapes(&session, km);
    }
  }
  Ok(())
}
