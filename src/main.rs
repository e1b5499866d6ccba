use env_logger::Env;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = gfx_app::default().run() {
        log::error!("{e}");
        return Err(e.into());
    }
    Ok(())
}
