//! Integration tests for the frame decode path.
//!
//! Exercises brawofx-reader's orchestrator and completion callback against
//! the stub codec's handle ledger.

use std::thread;

use brawofx_core::{ImageBufferMut, PixelComponents, PointD, RectI, RgbFrame};
use brawofx_reader::descriptor::names;
use brawofx_reader::{DecodeRequest, HostParams, Quality, ReaderError};
use brawofx_sdk::stub::{stub_pixel, FailurePoint, HandleKind, LedgerSnapshot, StubClip, StubRuntime};
use brawofx_sdk::{AttributeValue, ClipAttribute, FrameAttribute, ResolutionScale, ResourceFormat};

use crate::support::{Fixture, CLIP};

fn fixture() -> Fixture {
    Fixture::new(StubClip::new(64, 32))
}

fn rgb(frame_index: u64, generation: usize, x: u32, y: u32) -> [f32; 3] {
    [0, 1, 2].map(|c| stub_pixel(frame_index, generation, x, y, c))
}

// ── Handle release on failure ──────────────────────────────────

fn assert_fails_at(point: FailurePoint, expected: &[(HandleKind, usize)]) {
    let mut fx = fixture();
    fx.rt.fail_at(Some(point));
    let (result, _) = fx.decode(1.0, 64, 32);

    assert!(
        matches!(result, Err(ReaderError::UnsupportedFootage)),
        "{point:?}: {result:?}"
    );
    let ledger = fx.rt.ledger();
    assert!(ledger.is_balanced(), "{point:?}: {ledger:?}");
    for &(kind, count) in expected {
        assert_eq!(ledger.acquired(kind), count, "{point:?} {kind:?}");
        assert_eq!(ledger.released(kind), count, "{point:?} {kind:?}");
    }
}

#[test]
fn factory_failure_acquires_nothing() {
    assert_fails_at(
        FailurePoint::CreateFactory,
        &[(HandleKind::Factory, 0), (HandleKind::Codec, 0), (HandleKind::Clip, 0)],
    );
}

#[test]
fn codec_failure_releases_factory() {
    assert_fails_at(
        FailurePoint::CreateCodec,
        &[(HandleKind::Factory, 1), (HandleKind::Codec, 0), (HandleKind::Clip, 0)],
    );
}

#[test]
fn clip_failure_releases_codec_and_factory() {
    assert_fails_at(
        FailurePoint::OpenClip,
        &[(HandleKind::Factory, 1), (HandleKind::Codec, 1), (HandleKind::Clip, 0)],
    );
}

#[test]
fn callback_failure_releases_clip() {
    assert_fails_at(
        FailurePoint::SetCallback,
        &[(HandleKind::Codec, 1), (HandleKind::Clip, 1), (HandleKind::Job, 0)],
    );
}

#[test]
fn job_creation_failure_releases_clip() {
    assert_fails_at(FailurePoint::CreateJob, &[(HandleKind::Clip, 1), (HandleKind::Job, 0)]);
}

#[test]
fn submit_failure_releases_job() {
    assert_fails_at(FailurePoint::SubmitJob, &[(HandleKind::Clip, 1), (HandleKind::Job, 1)]);
}

#[test]
fn completion_failures_report_unsupported_footage() {
    assert_fails_at(FailurePoint::ReadComplete, &[(HandleKind::Job, 1)]);
    assert_fails_at(FailurePoint::SubmitDecode, &[(HandleKind::Job, 1)]);
    assert_fails_at(FailurePoint::ProcessComplete, &[(HandleKind::Job, 2)]);
}

#[test]
fn failed_decode_fails_again_unchanged() {
    let mut fx = fixture();
    fx.rt.fail_at(Some(FailurePoint::OpenClip));
    assert!(fx.decode(1.0, 64, 32).0.is_err());
    assert!(fx.decode(1.0, 64, 32).0.is_err());
    assert_eq!(fx.rt.ledger().acquired(HandleKind::Factory), 2);

    fx.rt.fail_at(None);
    assert!(fx.decode(1.0, 64, 32).0.is_ok());
}

// ── Format preconditions ───────────────────────────────────────

#[test]
fn wrong_format_fails_before_any_handle() {
    let mut fx = fixture();
    let mut frame = RgbFrame::new(64, 32);

    let mut rgba = DecodeRequest::rgb(CLIP, 1.0, RectI::from_size(64, 32));
    rgba.components = PixelComponents::Rgba;
    rgba.component_count = 4;
    let mut scaled = DecodeRequest::rgb(CLIP, 1.0, RectI::from_size(64, 32));
    scaled.render_scale = PointD::new(1.0, 0.5);
    let unnamed = DecodeRequest::rgb("", 1.0, RectI::from_size(64, 32));

    for request in [rgba, scaled, unnamed] {
        let result = fx.reader.decode(&request, &mut frame.as_image_mut());
        assert!(matches!(result, Err(ReaderError::WrongInput)));
        assert_eq!(fx.reader.persistent_message(), Some("Wrong input!"));
    }
    assert_eq!(fx.rt.ledger(), LedgerSnapshot::default());
}

// ── Delivery and copy ─────────────────────────────────────────

#[test]
fn host_time_maps_to_zero_based_frame() {
    let mut fx = fixture();
    for (time, index) in [(0.0, 0), (1.0, 0), (5.0, 4)] {
        let (result, frame) = fx.decode(time, 64, 32);
        result.unwrap();
        assert_eq!(frame.pixel(5, 9), rgb(index, 0, 5, 9), "time {time}");
    }
    let indices: Vec<u64> = fx.rt.applied().iter().map(|a| a.frame_index).collect();
    assert_eq!(indices, [0, 0, 4]);
    assert!(fx.rt.ledger().is_balanced());
}

#[test]
fn zero_deliveries_is_an_error() {
    let mut fx = fixture();
    fx.rt.set_deliveries(0);
    let (result, _) = fx.decode(1.0, 64, 32);
    assert!(matches!(result, Err(ReaderError::UnsupportedFootage)));
    assert!(fx.rt.ledger().is_balanced());
}

#[test]
fn last_of_several_deliveries_wins() {
    let mut fx = fixture();
    fx.rt.set_deliveries(3);
    let (result, frame) = fx.decode(2.0, 64, 32);
    result.unwrap();
    assert_eq!(frame.pixel(0, 0), rgb(1, 2, 0, 0));
    assert_eq!(frame.pixel(63, 31), rgb(1, 2, 63, 31));
}

#[test]
fn callback_runs_off_the_calling_thread() {
    let mut fx = fixture();
    fx.decode(1.0, 64, 32).0.unwrap();
    let threads = fx.rt.callback_threads();
    assert!(!threads.is_empty());
    assert!(!threads.contains(&thread::current().id()));
}

#[test]
fn extra_channels_are_left_untouched() {
    let mut fx = fixture();
    let (width, height) = (64u32, 32u32);
    let mut data = vec![-1.0f32; width as usize * height as usize * 4];
    let mut view = ImageBufferMut::new(&mut data, width, height, 4, width as usize * 4 * 4).unwrap();
    let request = DecodeRequest::rgb(CLIP, 1.0, RectI::from_size(width as i32, height as i32));
    fx.reader.decode(&request, &mut view).unwrap();

    let px = (7 * width as usize + 2) * 4;
    assert_eq!(&data[px..px + 3], &rgb(0, 0, 2, 7));
    assert!(data.chunks_exact(4).all(|p| p[3] == -1.0));
}

#[test]
fn quality_window_is_copied_from_scaled_image() {
    let mut fx = Fixture::new(StubClip::new(4096, 2160));
    fx.reader.params_mut().set_choice(names::QUALITY, Quality::Eighth.index()).unwrap();
    let (result, frame) = fx.decode(1.0, 512, 270);
    result.unwrap();
    assert_eq!(frame.pixel(511, 269), rgb(0, 0, 511, 269));
    assert_eq!(fx.rt.applied()[0].resolution_scale, ResolutionScale::Eighth);
}

// ── Applied grade ──────────────────────────────────────────────

#[test]
fn decode_applies_host_parameters() {
    let mut fx = fixture();
    fx.reader.set_file(CLIP).unwrap();
    let params = fx.reader.params_mut();
    params.select_option(names::ISO, "1600").unwrap();
    params.select_option(names::GAMMA, "Blackmagic Design Custom").unwrap();
    params.select_option(names::QUALITY, "Half").unwrap();
    params.set_int(names::COLOR_TEMP, 3200).unwrap();
    params.set_double(names::CONTRAST, 1.4).unwrap();
    params.set_boolean(names::RECOVERY, true).unwrap();

    fx.decode(1.0, 32, 16).0.unwrap();

    let applied = fx.rt.applied();
    let applied = applied.last().unwrap();
    assert_eq!(applied.resolution_scale, ResolutionScale::Half);
    assert_eq!(applied.resource_format, ResourceFormat::RgbF32);
    assert_eq!(
        applied.clip_attribute(ClipAttribute::Gamma),
        Some(&AttributeValue::Text("Blackmagic Design Custom".into()))
    );
    assert_eq!(applied.clip_attribute(ClipAttribute::Gamut), Some(&AttributeValue::Text("Blackmagic Design".into())));
    assert_eq!(applied.clip_attribute(ClipAttribute::ToneCurveContrast), Some(&AttributeValue::F32(1.4)));
    assert_eq!(applied.clip_attribute(ClipAttribute::HighlightRecovery), Some(&AttributeValue::U16(1)));
    assert_eq!(applied.frame_attribute(FrameAttribute::WhiteBalanceKelvin), Some(&AttributeValue::U32(3200)));
    assert_eq!(applied.frame_attribute(FrameAttribute::WhiteBalanceTint), Some(&AttributeValue::S16(10)));
    assert_eq!(applied.frame_attribute(FrameAttribute::Iso), Some(&AttributeValue::U32(1600)));
}

#[test]
fn unbound_clip_leaves_iso_and_gamma_unset() {
    let mut fx = fixture();
    fx.decode(1.0, 64, 32).0.unwrap();
    let applied = &fx.rt.applied()[0];
    assert_eq!(applied.frame_attribute(FrameAttribute::Iso), None);
    assert_eq!(applied.clip_attribute(ClipAttribute::Gamma), None);
    assert_eq!(applied.resolution_scale, ResolutionScale::Full);
}

#[test]
fn missing_library_is_a_configuration_error() {
    let rt = StubRuntime::new().with_clip(CLIP, StubClip::new(64, 32));
    let config = brawofx_reader::ReaderConfig {
        bundle_root: Some("/nonexistent/bundle.ofx.bundle".into()),
        sdk_dir: Some("/nonexistent/sdk".into()),
        ..Default::default()
    };
    let mut reader =
        brawofx_reader::BrawReader::new(brawofx_reader::ParamStore::new(), config, std::sync::Arc::new(rt.clone()))
            .unwrap();
    if reader.library_dir().is_some() {
        // A system install exists on this machine.
        return;
    }
    let mut frame = RgbFrame::new(64, 32);
    let request = DecodeRequest::rgb(CLIP, 1.0, RectI::from_size(64, 32));
    let result = reader.decode(&request, &mut frame.as_image_mut());
    assert!(matches!(result, Err(ReaderError::LibraryNotFound)));
    assert_eq!(rt.ledger(), LedgerSnapshot::default());
}
