use crate::errors::RpcError;
use crate::model::{
    ActivePlayer, DirectoryEntry, ImageData, LibraryAction, PlayerStreams, PlayerTiming, RawItem,
};

/// Upstream operations the engine consumes.
///
/// Every call is blocking and bounded by the client timeout. The poller
/// is generic over this trait so tests can script a fake device.
pub trait KodiApi: Send + Sync {
    fn active_players(&self) -> Result<Vec<ActivePlayer>, RpcError>;

    fn player_timing(&self, player_id: i64) -> Result<PlayerTiming, RpcError>;

    fn player_streams(&self, player_id: i64) -> Result<PlayerStreams, RpcError>;

    fn player_item(&self, player_id: i64) -> Result<RawItem, RpcError>;

    fn list_directory(&self, directory: &str) -> Result<Vec<DirectoryEntry>, RpcError>;

    fn run_library_action(&self, action: LibraryAction) -> Result<(), RpcError>;

    /// Downloads an `image://` reference through the device's image handler.
    fn fetch_image(&self, reference: &str) -> Result<ImageData, RpcError>;
}

impl<T: KodiApi + ?Sized> KodiApi for std::sync::Arc<T> {
    fn active_players(&self) -> Result<Vec<ActivePlayer>, RpcError> {
        (**self).active_players()
    }

    fn player_timing(&self, player_id: i64) -> Result<PlayerTiming, RpcError> {
        (**self).player_timing(player_id)
    }

    fn player_streams(&self, player_id: i64) -> Result<PlayerStreams, RpcError> {
        (**self).player_streams(player_id)
    }

    fn player_item(&self, player_id: i64) -> Result<RawItem, RpcError> {
        (**self).player_item(player_id)
    }

    fn list_directory(&self, directory: &str) -> Result<Vec<DirectoryEntry>, RpcError> {
        (**self).list_directory(directory)
    }

    fn run_library_action(&self, action: LibraryAction) -> Result<(), RpcError> {
        (**self).run_library_action(action)
    }

    fn fetch_image(&self, reference: &str) -> Result<ImageData, RpcError> {
        (**self).fetch_image(reference)
    }
}

impl<T: KodiApi + ?Sized> KodiApi for &T {
    fn active_players(&self) -> Result<Vec<ActivePlayer>, RpcError> {
        (**self).active_players()
    }

    fn player_timing(&self, player_id: i64) -> Result<PlayerTiming, RpcError> {
        (**self).player_timing(player_id)
    }

    fn player_streams(&self, player_id: i64) -> Result<PlayerStreams, RpcError> {
        (**self).player_streams(player_id)
    }

    fn player_item(&self, player_id: i64) -> Result<RawItem, RpcError> {
        (**self).player_item(player_id)
    }

    fn list_directory(&self, directory: &str) -> Result<Vec<DirectoryEntry>, RpcError> {
        (**self).list_directory(directory)
    }

    fn run_library_action(&self, action: LibraryAction) -> Result<(), RpcError> {
        (**self).run_library_action(action)
    }

    fn fetch_image(&self, reference: &str) -> Result<ImageData, RpcError> {
        (**self).fetch_image(reference)
    }
}
