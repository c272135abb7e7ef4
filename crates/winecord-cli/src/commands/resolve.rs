use anyhow::{bail, Result};

use winecord_core::resolver::resolve;
use winecord_core::AppConfig;

pub fn run(config: &AppConfig, path: &str) -> Result<()> {
    let settings = config.presence_settings();
    let name = resolve(path, &settings.blacklist, &settings.overrides);

    if name.is_empty() {
        bail!("'{}' is not a game executable (not a .exe, or blacklisted)", path);
    }

    println!("{}", name);
    Ok(())
}
