//! `icesheet` executable.
//!
//! ```text
//! icesheet -i start.bin -y 1000 -o end.bin
//! icesheet -bootstrap -i partial.nc -grid_Mx 61 -grid_My 61 -ys -1000 -ye 0
//! ```

use icesheet_rs::cli::{self, Cli};

fn main() -> anyhow::Result<()> {
    cli::run(Cli::from_env())?;
    Ok(())
}
