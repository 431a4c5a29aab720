use anyhow::Result;
use wftrace::template::status_legend;

pub fn run() -> Result<()> {
    println!("Status legend:");
    for (name, icon) in status_legend() {
        println!("  {}  {}", icon, name);
    }
    Ok(())
}
