//! Terminal output shared by the commands.

pub mod colors;
pub mod errors;

use colors::ColorSupport;

pub struct OutputHandler {
    colors: ColorSupport,
}

impl OutputHandler {
    pub fn new() -> Self {
        Self {
            colors: ColorSupport::detect(),
        }
    }

    pub fn info(&self, message: &str) {
        println!("{}", self.colors.dim(message));
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", self.colors.green("✓"), message);
    }

    pub fn warn(&self, message: &str) {
        println!("{} {}", self.colors.yellow("⚠"), message);
    }

    /// `  label  value` with the label bold
    pub fn field(&self, label: &str, value: &str) {
        println!("  {:<10} {}", self.colors.bold(label), value);
    }

    pub fn heading(&self, message: &str) {
        println!("{}", self.colors.bold(message));
    }
}

impl Default for OutputHandler {
    fn default() -> Self {
        Self::new()
    }
}
