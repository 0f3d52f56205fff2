use colored::Colorize;
use once_cell::sync::Lazy;

pub static SUCCESS: Lazy<colored::ColoredString> = Lazy::new(|| "[TPA]".green());
pub static FAIL: Lazy<colored::ColoredString> = Lazy::new(|| "[TPA]".red());
pub static WARN: Lazy<colored::ColoredString> = Lazy::new(|| "[TPA]".yellow());
