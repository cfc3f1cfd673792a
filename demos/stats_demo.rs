use clap::Parser;
use compact_storage::FnvBuildHasher;
use compact_storage::HashTable;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Percentage of inserted keys removed again before printing.
    #[arg(short = 'r', long = "remove_percent", default_value_t = 10)]
    remove_percent: u32,

    #[arg(short = 's', long = "seed", default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<(), compact_storage::Error> {
    let args = Args::parse();

    println!(
        "Creating HashTable with target capacity: {}",
        args.target_capacity
    );

    let mut table: HashTable<FnvBuildHasher> = HashTable::with_capacity(args.target_capacity);
    let mut rng = SmallRng::seed_from_u64(args.seed);

    println!("Slot count: {}", table.capacity());
    println!("Filling table with random keys...");

    let mut keys = Vec::with_capacity(args.target_capacity);
    while keys.len() < args.target_capacity {
        let key = rng.random_range(1..=u64::MAX);
        if table.set(key, keys.len() as u64)?.is_none() {
            keys.push(key);
        }
    }

    let mut removed = 0;
    for &key in &keys {
        if rng.random_ratio(args.remove_percent.min(100), 100) {
            table.remove(key);
            removed += 1;
        }
    }

    println!("Inserted {} keys, removed {}", keys.len(), removed);
    println!("Slot count after filling: {}", table.capacity());
    println!(
        "Final load factor: {:.2}%",
        (table.len() as f64 / table.capacity() as f64) * 100.0
    );

    table.stats().print();
    Ok(())
}
