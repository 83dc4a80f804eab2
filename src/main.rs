mod app;
mod canvas;
mod chart;
mod config;
mod logging;
mod moon;
mod sky;
mod stage;
mod surface;
mod term;

use anyhow::Result;

fn main() -> Result<()> {
    app::run()
}
