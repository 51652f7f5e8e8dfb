//! Shared fixtures.

use std::sync::Arc;

use brawofx_core::{RectI, RgbFrame};
use brawofx_reader::{BrawReader, DecodeRequest, ParamStore, ReaderConfig, Result};
use brawofx_sdk::stub::{StubClip, StubRuntime};
use tempfile::TempDir;

pub const CLIP: &str = "/footage/A001_C001_0101AB.braw";

/// A reader over a stub codec with one clip registered at [`CLIP`].
pub struct Fixture {
    pub rt: StubRuntime,
    pub reader: BrawReader<ParamStore>,
    _sdk: TempDir,
}

impl Fixture {
    pub fn new(clip: StubClip) -> Self {
        Self::with_runtime(StubRuntime::new().with_clip(CLIP, clip))
    }

    pub fn with_runtime(rt: StubRuntime) -> Self {
        let sdk = tempfile::tempdir().unwrap();
        let config = ReaderConfig {
            sdk_dir: Some(sdk.path().to_path_buf()),
            ..Default::default()
        };
        let reader = BrawReader::new(ParamStore::new(), config, Arc::new(rt.clone())).unwrap();
        Self { rt, reader, _sdk: sdk }
    }

    /// Decode host time `time` of [`CLIP`] over the whole `width × height` window.
    pub fn decode(&mut self, time: f64, width: u32, height: u32) -> (Result<()>, RgbFrame) {
        let mut frame = RgbFrame::new(width, height);
        let request = DecodeRequest::rgb(CLIP, time, RectI::from_size(width as i32, height as i32));
        let result = self.reader.decode(&request, &mut frame.as_image_mut());
        (result, frame)
    }
}
