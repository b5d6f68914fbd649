use scaffolding::formats::manager::get_manager;
use scaffolding::{to_bytes, Region};
use tracing_subscriber::EnvFilter;

fn print_summary(region: &Region) {
    let (width, height, depth) = region.get_dimensions();
    println!("Size: {}x{}x{}", width, height, depth);
    println!("Offset: {:?}", region.offset());
    println!("Block entities: {}", region.block_entities().len());

    let mut counts: Vec<_> = region.count_block_types().into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.to_string().cmp(&b.0.to_string())));
    println!(
        "\nPalette ({} entries, {} non-air blocks):",
        region.palette().len(),
        region.count_non_air()
    );
    for (block, count) in &counts {
        println!("  {:>8}  {}", count, block);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let path = args
        .get(1)
        .expect("Usage: inspect_schematic <file> [--rotate DEGREES]");
    let rotate = args
        .iter()
        .position(|a| a == "--rotate")
        .and_then(|i| args.get(i + 1))
        .map(|v| v.parse::<i32>().expect("--rotate expects an integer"));

    let data = std::fs::read(path).expect("Failed to read file");
    let manager = get_manager();
    let manager = manager.lock().unwrap();

    println!("=== {} ===", path);
    println!(
        "Format: {}",
        manager
            .detect_format(&data)
            .unwrap_or_else(|| "unknown".to_string())
    );
    let region = manager.read(&data).expect("Failed to read schematic");
    print_summary(&region);

    if let Some(degrees) = rotate {
        let rotated = region.rotate_y(degrees).expect("Failed to rotate");
        let out = format!("{}.rot{}.scaf", path, degrees);
        std::fs::write(&out, to_bytes(&rotated).expect("Failed to encode"))
            .expect("Failed to write output");
        println!("\nRotated {} degrees -> {}", degrees, out);
        print_summary(&rotated);
    }
}
