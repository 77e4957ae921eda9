use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use keyforge::prelude::*;
use keyforge::{GeneratedKeysSupport, SequenceStorageOptions};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "keyforge")]
#[command(about = "Batched inserts and Hi-Lo identifiers against an in-memory database")]
struct Cli {
    /// JSON persister configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Insert generated cars and print their identifiers
    Insert {
        #[arg(long, default_value_t = 7)]
        count: usize,
        #[arg(long, value_enum, default_value_t = Strategy::GeneratedKeys)]
        strategy: Strategy,
        /// Roll the transaction back instead of committing it
        #[arg(long)]
        rollback: bool,
    },
    /// Draw values from a pooled sequence
    Sequence {
        #[arg(long, default_value = "car_seq")]
        name: String,
        #[arg(long, default_value_t = 10)]
        count: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    GeneratedKeys,
    BeforeInsert,
    Assigned,
}

#[derive(Debug, Default)]
struct CarRecord {
    id: Option<i64>,
    model: String,
    version: i64,
    stored: bool,
}

type Car = Rc<RefCell<CarRecord>>;

struct CarMapping {
    table: TableSchema,
}

impl CarMapping {
    fn new(generated_id: bool) -> Self {
        let mut id = Column::new("id", DataType::Integer).primary_key();
        if generated_id {
            id = id.auto_generated();
        }
        Self {
            table: TableSchema::new(
                "car",
                vec![
                    id,
                    Column::new("model", DataType::Text).not_null(),
                    Column::new("version", DataType::Integer).not_null(),
                ],
            ),
        }
    }
}

impl EntityMapping<Car> for CarMapping {
    fn table(&self) -> &TableSchema {
        &self.table
    }

    fn insert_values(&self, car: &Car) -> ColumnValues {
        let car = car.borrow();
        let mut values = ColumnValues::new();
        values.insert("id".into(), car.id.into());
        values.insert("model".into(), car.model.clone().into());
        values.insert("version".into(), car.version.into());
        values
    }

    fn from_row(&self, row: &ColumnValues) -> keyforge::Result<Car> {
        let field = |name: &str| {
            row.get(name)
                .cloned()
                .ok_or_else(|| PersistError::ExecutionError(format!("column '{}' missing", name)))
        };
        Ok(Rc::new(RefCell::new(CarRecord {
            id: field("id")?.as_i64(),
            model: field("model")?.to_string(),
            version: field("version")?.as_i64().unwrap_or_default(),
            stored: true,
        })))
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PersisterConfig> {
    match path {
        Some(path) => PersisterConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(PersisterConfig::default()),
    }
}

fn sequence(db: &MemoryDatabase, config: &PersisterConfig, name: &str) -> Result<PooledHiLoSequence> {
    let storage: SequenceStorageOptions = config.sequence.storage.clone();
    if !db.table_exists(&storage.table) {
        db.create_table(storage.table_schema())?;
    }
    let persister = SequencePersister::new(storage, Arc::new(db.clone()))?;
    Ok(PooledHiLoSequence::new(config.sequence.sequence(name), persister)?)
}

fn run_insert(config: PersisterConfig, count: usize, strategy: Strategy, rollback: bool) -> Result<()> {
    let generated_keys = match config.key_read_back {
        KeyReadBack::InsertionOrder => GeneratedKeysSupport::AllRows,
        KeyReadBack::HighestOnly => GeneratedKeysSupport::HighestOnly,
    };
    let db = MemoryDatabase::with_generated_keys(generated_keys);
    let mapping = CarMapping::new(matches!(strategy, Strategy::GeneratedKeys));
    db.create_table(mapping.table.clone())?;

    let identifiers: IdentifierInsertionManager<Car, i64> = match strategy {
        Strategy::GeneratedKeys => {
            IdentifierInsertionManager::GeneratedKeys(GeneratedKeysIdentifierManager::new("id"))
        }
        Strategy::BeforeInsert => IdentifierInsertionManager::BeforeInsert(
            BeforeInsertIdentifierManager::new(Arc::new(sequence(&db, &config, "car_seq")?)),
        ),
        Strategy::Assigned => IdentifierInsertionManager::AlreadyAssigned(
            AlreadyAssignedIdentifierManager::new(
                |car: &Car| car.borrow().stored,
                |car: &Car| car.borrow_mut().stored = true,
            ),
        ),
    };
    let accessor = FnIdAccessor::new(
        |car: &Car| car.borrow().id,
        |car: &Car, id: i64| car.borrow_mut().id = Some(id),
    );
    let versioning = OptimisticLockManager::versioned(
        "version",
        IntegerVersioning::new(
            |car: &Car| car.borrow().version,
            |car: &Car, version| car.borrow_mut().version = version,
        ),
    );
    let persister = Persister::new(mapping, accessor, identifiers)
        .with_config(config)?
        .with_versioning(versioning);

    let cars: Vec<Car> = (0..count)
        .map(|i| {
            Rc::new(RefCell::new(CarRecord {
                id: matches!(strategy, Strategy::Assigned).then_some(1000 + i as i64),
                model: format!("model-{}", i + 1),
                ..CarRecord::default()
            }))
        })
        .collect();

    let mut conn = db.connect();
    conn.begin()?;
    persister.insert(&cars, &mut conn)?;
    for car in &cars {
        let car = car.borrow();
        let id = car.id.map_or_else(|| "-".to_string(), |id| id.to_string());
        println!("{:>6}  {:<10} version {}", id, car.model, car.version);
    }

    if rollback {
        conn.rollback()?;
        info!("transaction rolled back");
    } else {
        conn.commit()?;
    }
    println!(
        "{} row(s) stored in {} batch(es) of at most {}",
        db.row_count("car")?,
        db.executed_batches()?,
        persister.config().batch_size
    );
    if let Some(car) = cars.first() {
        println!("first car is at version {}", car.borrow().version);
    }
    Ok(())
}

fn run_sequence(config: PersisterConfig, name: &str, count: usize) -> Result<()> {
    let db = MemoryDatabase::new();
    let sequence = sequence(&db, &config, name)?;
    let values = (0..count)
        .map(|_| sequence.next())
        .collect::<keyforge::Result<Vec<i64>>>()?;
    println!("{:?}", values);
    println!(
        "{} reservation(s), stored value {}",
        sequence.reservation_count(),
        sequence
            .persister()
            .current(name)?
            .ok_or_else(|| anyhow!("sequence '{}' has no row", name))?
    );
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("keyforge=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Insert {
            count,
            strategy,
            rollback,
        } => run_insert(config, count, strategy, rollback),
        Command::Sequence { name, count } => run_sequence(config, &name, count),
    }
}
