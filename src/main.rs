pub mod app;
pub mod renderer;

use color_eyre::Result;
use app::App;
use app::config::AppConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    App::new(AppConfig::default()).run()
}
