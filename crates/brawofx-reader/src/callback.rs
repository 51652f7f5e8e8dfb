//! Decode completion callback.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use brawofx_sdk::{ProcessedImage, RawCallback, ReadFrame, ResourceFormat, SdkResult};
use tracing::{debug, error, warn};

use crate::decode_params::DecodeParameterSet;

/// Holds the last processed image delivered for a decode.
///
/// Written from the codec's threads, read by the decoding thread once
/// `flush_jobs` has returned.
#[derive(Debug)]
pub struct FrameSlot {
    image: AtomicPtr<ProcessedImage>,
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            image: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Replace the held image. Images without pixels are ignored.
    pub fn store(&self, image: ProcessedImage) {
        if image.data.is_null() {
            return;
        }
        let new = Box::into_raw(Box::new(image));
        let old = self.image.swap(new, Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: every non-null pointer in the slot came from Box::into_raw
            // and is owned by whoever swaps it out.
            drop(unsafe { Box::from_raw(old) });
        }
    }

    /// Take the held image, leaving the slot empty.
    pub fn take(&self) -> Option<ProcessedImage> {
        let old = self.image.swap(ptr::null_mut(), Ordering::AcqRel);
        if old.is_null() {
            None
        } else {
            // SAFETY: see `store`.
            Some(*unsafe { Box::from_raw(old) })
        }
    }

    pub fn clear(&self) {
        let _ = self.take();
    }

    pub fn is_empty(&self) -> bool {
        self.image.load(Ordering::Acquire).is_null()
    }
}

impl Drop for FrameSlot {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Applies a [`DecodeParameterSet`] to every read frame and collects the
/// processed result.
#[derive(Debug)]
pub struct DecodeCallback {
    params: DecodeParameterSet,
    slot: FrameSlot,
    deliveries: AtomicUsize,
}

impl DecodeCallback {
    pub fn new(params: DecodeParameterSet) -> Self {
        Self {
            params,
            slot: FrameSlot::new(),
            deliveries: AtomicUsize::new(0),
        }
    }

    pub fn params(&self) -> &DecodeParameterSet {
        &self.params
    }

    pub fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Number of processed images received, including empty ones.
    pub fn deliveries(&self) -> usize {
        self.deliveries.load(Ordering::Acquire)
    }

    fn configure(&self, frame: &mut dyn ReadFrame) -> SdkResult<()> {
        frame.set_resolution_scale(self.params.quality.resolution_scale())?;
        frame.set_resource_format(ResourceFormat::RgbF32)?;

        // A rejected grade value must not cost the frame.
        for (attribute, value) in self.params.clip_attributes() {
            if let Err(e) = frame.set_clip_attribute(attribute, value) {
                warn!(?attribute, error = %e, "clip attribute not applied");
            }
        }
        for (attribute, value) in self.params.frame_attributes() {
            if let Err(e) = frame.set_frame_attribute(attribute, value) {
                warn!(?attribute, error = %e, "frame attribute not applied");
            }
        }

        frame.submit_decode()
    }
}

impl RawCallback for DecodeCallback {
    fn read_complete(&self, frame_index: u64, result: SdkResult<&mut dyn ReadFrame>) {
        match result {
            Ok(frame) => {
                if let Err(e) = self.configure(frame) {
                    error!(frame_index, error = %e, "could not start decode");
                }
            }
            Err(e) => warn!(frame_index, error = %e, "read failed"),
        }
    }

    fn process_complete(&self, frame_index: u64, result: SdkResult<ProcessedImage>) {
        match result {
            Ok(image) => {
                self.deliveries.fetch_add(1, Ordering::AcqRel);
                debug!(frame_index, width = image.width, height = image.height, "frame processed");
                self.slot.store(image);
            }
            Err(e) => warn!(frame_index, error = %e, "processing failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brawofx_sdk::{AttributeValue, ClipAttribute, FrameAttribute, ResolutionScale, SdkError};

    static PIXELS: [f32; 6] = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];

    fn image(width: u32) -> ProcessedImage {
        ProcessedImage {
            data: PIXELS.as_ptr(),
            width,
            height: 1,
            size_bytes: std::mem::size_of_val(&PIXELS),
        }
    }

    #[derive(Default)]
    struct RecordingFrame {
        scale: Option<ResolutionScale>,
        format: Option<ResourceFormat>,
        clip: Vec<(ClipAttribute, AttributeValue)>,
        frame: Vec<(FrameAttribute, AttributeValue)>,
        reject_gamma: bool,
        submitted: bool,
    }

    impl ReadFrame for RecordingFrame {
        fn set_resolution_scale(&mut self, scale: ResolutionScale) -> SdkResult<()> {
            self.scale = Some(scale);
            Ok(())
        }

        fn set_resource_format(&mut self, format: ResourceFormat) -> SdkResult<()> {
            self.format = Some(format);
            Ok(())
        }

        fn set_clip_attribute(&mut self, attribute: ClipAttribute, value: AttributeValue) -> SdkResult<()> {
            if self.reject_gamma && attribute == ClipAttribute::Gamma {
                return Err(SdkError::UnsupportedValue("gamma".into()));
            }
            self.clip.push((attribute, value));
            Ok(())
        }

        fn set_frame_attribute(&mut self, attribute: FrameAttribute, value: AttributeValue) -> SdkResult<()> {
            self.frame.push((attribute, value));
            Ok(())
        }

        fn submit_decode(&mut self) -> SdkResult<()> {
            self.submitted = true;
            Ok(())
        }
    }

    #[test]
    fn test_slot_keeps_last_image() {
        let slot = FrameSlot::new();
        assert!(slot.is_empty());
        slot.store(image(1));
        slot.store(image(2));
        assert_eq!(slot.take().map(|i| i.width), Some(2));
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_slot_ignores_null_image() {
        let slot = FrameSlot::new();
        slot.store(image(2));
        slot.store(ProcessedImage {
            data: ptr::null(),
            width: 0,
            height: 0,
            size_bytes: 0,
        });
        assert_eq!(slot.take().map(|i| i.width), Some(2));
    }

    #[test]
    fn test_read_complete_configures_frame() {
        let params = DecodeParameterSet {
            quality: crate::Quality::Half,
            iso: Some(800),
            gamma: "Rec.709".into(),
            ..Default::default()
        };
        let callback = DecodeCallback::new(params);
        let mut frame = RecordingFrame::default();
        callback.read_complete(0, Ok(&mut frame));

        assert_eq!(frame.scale, Some(ResolutionScale::Half));
        assert_eq!(frame.format, Some(ResourceFormat::RgbF32));
        assert!(frame.clip.contains(&(ClipAttribute::Gamma, AttributeValue::Text("Rec.709".into()))));
        assert!(frame.frame.contains(&(FrameAttribute::Iso, AttributeValue::U32(800))));
        assert!(frame.submitted);
    }

    #[test]
    fn test_rejected_attribute_still_decodes() {
        let params = DecodeParameterSet {
            gamma: "Blackmagic Design Custom".into(),
            ..Default::default()
        };
        let callback = DecodeCallback::new(params);
        let mut frame = RecordingFrame {
            reject_gamma: true,
            ..Default::default()
        };
        callback.read_complete(0, Ok(&mut frame));
        assert!(frame.submitted);
        assert!(frame.clip.iter().all(|(a, _)| *a != ClipAttribute::Gamma));
    }

    #[test]
    fn test_errors_leave_slot_untouched() {
        let callback = DecodeCallback::new(DecodeParameterSet::default());
        callback.process_complete(0, Ok(image(2)));
        callback.process_complete(0, Err(SdkError::UnsupportedValue("format".into())));
        callback.read_complete(1, Err(SdkError::UnsupportedValue("read".into())));
        assert_eq!(callback.deliveries(), 1);
        assert_eq!(callback.slot().take().map(|i| i.width), Some(2));
    }
}
