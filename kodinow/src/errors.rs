use thiserror::Error;

#[derive(Error, Debug)]
pub enum NowPlayingError {
    #[error("Failed to spawn poller thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Poller thread panicked")]
    Panicked,
}
