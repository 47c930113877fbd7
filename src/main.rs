use simulation::run_simulation;
use tracing_subscriber::EnvFilter;
pub mod simulation;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            STORE ⇄ DOCUMENT SYNC SIMULATION                 ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut failures = 0;

    // Run 1: a couple of peers, short session
    let stats = run_simulation(2, 100, 1).await?;
    stats.print();
    failures += usize::from(!stats.converged);

    // Run 2: small team
    let stats = run_simulation(4, 250, 2).await?;
    stats.print();
    failures += usize::from(!stats.converged);

    // Run 3: larger room
    let stats = run_simulation(10, 200, 3).await?;
    stats.print();
    failures += usize::from(!stats.converged);

    if failures > 0 {
        return Err(format!("{} simulation run(s) did not converge", failures).into());
    }
    println!("\n✓ All simulations converged!");
    Ok(())
}
