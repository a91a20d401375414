// Host shell: where notices are shown and newly created notes are opened

use tracing::info;

pub trait Host: Send + Sync {
    /// Show a short user-visible message
    fn notice(&self, message: &str);

    /// Bring a freshly created project note in front of the user
    fn openDocument(&self, path: &str);
}

/// Terminal host used by the CLI
#[derive(Debug, Default)]
pub struct ConsoleHost;

impl Host for ConsoleHost {
    fn notice(&self, message: &str) {
        println!("{}", message);
    }

    fn openDocument(&self, path: &str) {
        info!("[ConsoleHost::openDocument] {}", path);
        println!("Created {}", path);
    }
}
