use clap::Parser;

/// User-specified command line parameters
#[derive(Debug, Parser)]
#[clap(name = "Applause Engine", about)]
pub struct Args {
    #[clap(long, short = 'f')]
    /// Start in fullscreen.
    pub fullscreen: bool,

    #[clap(long, short = 'e', value_name = "SECONDS")]
    /// Exit automatically after this many wall-clock seconds; meant for
    /// CI soak runs together with the input fuzzer.
    pub exitafter: Option<u32>,

    #[clap(long)]
    /// Abort the process on the first error-level log record.
    pub aoe: bool,

    #[clap(long, short = 's', value_name = "IP")]
    /// Ship the log ring to (and accept commands from) a headless server
    /// at this address.
    pub server: Option<String>,

    #[clap(long, short = 'b', value_name = "DIR")]
    /// Root directory for engine resources (configs, assets, shaders).
    pub base_url: Option<String>,
}
