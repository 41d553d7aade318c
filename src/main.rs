use anyhow::Result;

use nectl::commands::{self, Toolkit};

fn main() -> Result<()> {
    commands::main(&Toolkit::default())
}
