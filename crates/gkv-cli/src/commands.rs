use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, ensure, Context};
use chrono::Utc;
use colored::Colorize;
use futures::future::try_join_all;
use gkv_codec::Value;
use gkv_crypto::blob_hash;
use gkv_db::refs::type_ref;
use gkv_db::{CreateOptions, Database, DatabaseConfig, GcOptions};
use gkv_repo::{Credentials, RepositoryConfig, Repository};
use gkv_store::InMemoryRemote;
use tracing::debug;

use crate::cli::*;

/// Everything a command needs: the database and where its state lives.
struct Session {
    remote: Arc<InMemoryRemote>,
    db: Database,
    credentials: Credentials,
    state: Option<PathBuf>,
    slug: String,
}

impl Session {
    async fn open(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => DatabaseConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => DatabaseConfig::default(),
        };
        if let Some(slug) = &cli.repo {
            let Some(parsed) = RepositoryConfig::from_slug(slug) else {
                bail!("repository must be given as <owner>/<name>, got {slug:?}");
            };
            config.repository.owner = parsed.owner;
            config.repository.name = parsed.name;
        }
        let slug = format!("{}/{}", config.repository.owner, config.repository.name);

        let remote = match &cli.state {
            Some(path) if path.exists() => InMemoryRemote::load(path)
                .with_context(|| format!("loading state from {}", path.display()))?,
            _ => InMemoryRemote::new(),
        };
        let credentials = Credentials::new(cli.token.clone());
        remote.set_authenticated(credentials.is_authenticated());
        let remote = Arc::new(remote);

        let repo = Repository::open(config.repository, remote.clone())
            .await?
            .with_edge(remote.clone());
        debug!(?credentials, repo = %slug, "session opened");
        Ok(Self {
            db: Database::new(repo).with_gc_batch_size(config.gc_batch_size),
            remote,
            credentials,
            state: cli.state.clone(),
            slug,
        })
    }

    /// Fail unless a repository and a token were given.
    fn require_write_access(&self) -> anyhow::Result<()> {
        ensure!(
            self.slug != "/",
            "pass <owner>/<name> with --repo or GH_REPO"
        );
        ensure!(
            self.credentials.is_authenticated(),
            "writes need a token: pass --token or set GH_TOKEN"
        );
        Ok(())
    }

    fn persist(&self) -> anyhow::Result<()> {
        if let Some(path) = &self.state {
            self.remote
                .save(path)
                .with_context(|| format!("saving state to {}", path.display()))?;
        }
        Ok(())
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let session = Session::open(&cli).await?;
    match cli.command {
        Command::Init => cmd_init(&session).await,
        Command::Gc(args) => cmd_gc(&session, args).await,
        Command::StressGc(args) => cmd_stress_gc(&session, args).await,
        Command::Types => cmd_types(&session).await,
        Command::Hash(args) => cmd_hash(&session, args).await,
    }
}

async fn cmd_init(session: &Session) -> anyhow::Result<()> {
    session.require_write_access()?;
    session.db.init().await?;
    session.persist()?;
    println!("{} Initialised {}", "✓".green().bold(), session.slug.bold());
    Ok(())
}

async fn cmd_gc(session: &Session, args: GcArgs) -> anyhow::Result<()> {
    session.require_write_access()?;
    let options = GcOptions {
        batch_size: args.batch_size,
    };
    let removed = session.db.gc(Utc::now(), options).await?;
    session.persist()?;
    println!(
        "{} GC: Removed {} stale keys at {}",
        "✓".green(),
        removed.to_string().bold(),
        session.slug.bold()
    );
    Ok(())
}

async fn cmd_stress_gc(session: &Session, args: StressGcArgs) -> anyhow::Result<()> {
    session.require_write_access()?;
    let db = &session.db;
    let keys: Vec<Value> = (0..args.keys).map(|i| Value::Number(i as f64)).collect();
    let value = Value::Number(2.0);

    try_join_all(keys.iter().map(|key| {
        let options = CreateOptions {
            ttl: Some(-1),
            ..CreateOptions::default()
        };
        db.create(key, Some(&value), options)
    }))
    .await?;
    println!("Created {} stale keys", args.keys.to_string().bold());

    let removed = db.gc(Utc::now(), GcOptions::default()).await?;
    let present = try_join_all(keys.iter().map(|key| db.has(key))).await?;
    session.persist()?;

    let survivors = present.into_iter().filter(|has| *has).count();
    ensure!(
        survivors == 0,
        "{survivors} of {} stale keys survived GC",
        args.keys
    );
    println!(
        "{} GC removed {} keys; none survived",
        "✓".green().bold(),
        removed.to_string().bold()
    );
    Ok(())
}

async fn cmd_types(session: &Session) -> anyhow::Result<()> {
    let registry = session.db.registry().await?;
    for (tag, commit) in registry.entries() {
        let published = session.db.repository().ref_target(&type_ref(tag)).await?;
        let status = match published {
            Some(id) if id == commit => "published".green(),
            Some(_) => "mismatch".red(),
            None => "missing".yellow(),
        };
        println!("{:<12} {}  {}", tag.to_string().bold(), commit.to_hex().dimmed(), status);
    }
    Ok(())
}

async fn cmd_hash(session: &Session, args: HashArgs) -> anyhow::Result<()> {
    let data = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let blob = blob_hash(&data);
    let value = match args.mime {
        Some(mime) => Value::blob(mime, data),
        None => Value::ArrayBuffer(data.into()),
    };
    let uuid = session.db.uuid(&value).await?;
    println!("blob   {}", blob.to_hex().yellow());
    println!("commit {}", uuid.commit.to_hex().yellow());
    println!("uuid   {}", uuid.to_string().cyan());
    Ok(())
}
