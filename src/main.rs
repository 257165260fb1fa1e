use std::io::BufRead;

use tracing_subscriber::EnvFilter;

use mesh_nodes::AppConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,mesh_nodes=info,hello_mesh_nodes=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    if let Err(error) = mesh_nodes::run(AppConfig::default()) {
        eprintln!("ERROR: {error}");
        eprintln!("Press Enter to terminate...");
        let mut line = String::new();
        let _ = std::io::stdin().lock().read_line(&mut line);
        return Err(error.into());
    }
    Ok(())
}
