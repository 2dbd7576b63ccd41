//! `chatweave config`: configuration inspection.

use chatweave_config::AppConfig;

pub fn show() {
    println!("{}", AppConfig::default_toml());
}

pub fn path() {
    println!("{}", AppConfig::config_dir().join("config.toml").display());
}
