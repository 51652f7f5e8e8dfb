//! Integration tests for clip introspection and parameter state.
//!
//! Exercises brawofx-reader's specs resolver, bounds and time domain
//! queries, and parameter resynchronization over the stub codec.

use std::path::Path;

use brawofx_core::{FrameRange, RectI};
use brawofx_reader::descriptor::names;
use brawofx_reader::specs;
use brawofx_reader::{ClipSpecs, HostParams, Quality};
use brawofx_sdk::stub::{StubClip, StubRuntime};
use brawofx_sdk::{AttributeValue, ClipAttribute};
use proptest::prelude::*;

use crate::support::{Fixture, CLIP};

const OTHER: &str = "/footage/A002_C007_0102CD.braw";

fn options(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

// ── Bounds ─────────────────────────────────────────────────────

#[test]
fn quarter_dci_4k_bounds() {
    let mut fx = Fixture::new(StubClip::new(4096, 2160));
    fx.reader.set_file(CLIP).unwrap();
    fx.reader.params_mut().set_choice(names::QUALITY, Quality::Quarter.index()).unwrap();

    let bounds = fx.reader.frame_bounds().unwrap();
    assert_eq!(bounds.rect, RectI::new(0, 0, 1024, 540));
    assert_eq!(bounds.pixel_aspect_ratio, 1.0);
    assert_eq!((bounds.tile_width, bounds.tile_height), (0, 0));
}

#[test]
fn bounds_fail_when_quality_leaves_no_pixels() {
    let mut fx = Fixture::new(StubClip::new(6, 6));
    fx.reader.set_file(CLIP).unwrap();
    assert!(fx.reader.frame_bounds().is_some());
    fx.reader.params_mut().set_choice(names::QUALITY, Quality::Eighth.index()).unwrap();
    assert!(fx.reader.frame_bounds().is_none());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bounds_follow_floor_division(w in 1u32..9000, h in 1u32..9000, q in 0usize..4) {
        let mut fx = Fixture::new(StubClip::new(w, h));
        fx.reader.set_file(CLIP).unwrap();
        fx.reader.params_mut().set_choice(names::QUALITY, q).unwrap();

        let d = Quality::from_index(q).divisor();
        match fx.reader.frame_bounds() {
            Some(b) => prop_assert_eq!(b.rect, RectI::from_size((w / d) as i32, (h / d) as i32)),
            None => prop_assert!(w / d == 0 || h / d == 0),
        }
    }
}

// ── Specs resolution ───────────────────────────────────────────

#[test]
fn corrupt_clip_resolves_to_zero() {
    let mut fx = Fixture::new(StubClip::corrupt());
    fx.reader.set_file(CLIP).unwrap();

    assert_eq!(fx.reader.specs(), &ClipSpecs::default());
    assert!(fx.reader.frame_bounds().is_none());
    assert_eq!(fx.reader.frame_rate(), None);
    assert_eq!(fx.reader.sequence_time_domain(Path::new(CLIP)), None);
    assert!(fx.rt.ledger().is_balanced());
}

#[test]
fn resolution_is_idempotent() {
    let rt = StubRuntime::new().with_clip(CLIP, StubClip::new(6144, 3456).with_frames(300, 23.976));
    let first = specs::resolve(&rt, Path::new(CLIP), Path::new("/sdk"));
    let second = specs::resolve(&rt, Path::new(CLIP), Path::new("/sdk"));
    assert!(first.is_usable());
    assert_eq!(first, second);
    assert!(rt.ledger().is_balanced());
}

#[test]
fn resolution_submits_no_jobs() {
    let rt = StubRuntime::new().with_clip(CLIP, StubClip::new(1920, 1080));
    specs::resolve(&rt, Path::new(CLIP), Path::new("/sdk"));
    let ledger = rt.ledger();
    assert_eq!(ledger.acquired(brawofx_sdk::stub::HandleKind::Clip), 1);
    assert_eq!(ledger.acquired(brawofx_sdk::stub::HandleKind::Job), 0);
    assert!(rt.applied().is_empty());
}

#[test]
fn time_domain_covers_every_frame() {
    let mut fx = Fixture::new(StubClip::new(3840, 2160).with_frames(250, 25.0));
    assert_eq!(fx.reader.sequence_time_domain(Path::new(CLIP)), Some(FrameRange::new(1, 250)));
    assert_eq!(fx.reader.frame_rate(), Some(25.0));
}

#[test]
fn clip_without_frames_has_no_time_domain() {
    let mut fx = Fixture::new(StubClip::new(3840, 2160).with_frames(0, 25.0));
    assert_eq!(fx.reader.sequence_time_domain(Path::new(CLIP)), None);
}

// ── Parameter resynchronization ────────────────────────────────

#[test]
fn new_file_replaces_options_and_grade() {
    let mut other = StubClip::new(1920, 1080)
        .with_clip_attribute(ClipAttribute::Gamma, AttributeValue::Text("Rec.709".into()))
        .with_clip_attribute(ClipAttribute::ToneCurveSaturation, AttributeValue::F32(1.25))
        .with_clip_attribute(ClipAttribute::ToneCurveVideoBlackLevel, AttributeValue::U16(1))
        .with_metadata("white_balance_kelvin", AttributeValue::U32(3200))
        .with_metadata("iso", AttributeValue::U32(1250));
    other.iso_list = vec![640, 1250, 2500];

    let rt = StubRuntime::new()
        .with_clip(CLIP, StubClip::new(4096, 2160))
        .with_clip(OTHER, other);
    let mut fx = Fixture::with_runtime(rt);

    fx.reader.set_file(CLIP).unwrap();
    fx.reader.params_mut().set_int(names::COLOR_TEMP, 7000).unwrap();
    fx.reader.set_file(OTHER).unwrap();

    let params = fx.reader.params();
    assert_eq!(params.choice_options(names::ISO).unwrap(), options(&["640", "1250", "2500"]));
    assert_eq!(params.selected_option(names::ISO).unwrap(), "1250");
    assert_eq!(params.selected_option(names::GAMMA).unwrap(), "Rec.709");
    assert_eq!(params.int(names::COLOR_TEMP).unwrap(), 3200);
    assert!((params.double(names::SATURATION).unwrap() - 1.25).abs() < 1e-6);
    assert!(params.boolean(names::VIDEO_BLACK_LEVEL).unwrap());
    assert_eq!(fx.reader.specs().width, 1920);
}

#[test]
fn restored_defaults_come_from_the_clip() {
    let mut fx = Fixture::new(StubClip::new(4096, 2160));
    fx.reader.set_file(CLIP).unwrap();
    let params = fx.reader.params_mut();
    params.set_int(names::TINT, -40).unwrap();
    params.set_choice(names::ISO, 0).unwrap();

    params.reset_to_default(names::TINT).unwrap();
    params.reset_to_default(names::ISO).unwrap();
    assert_eq!(params.int(names::TINT).unwrap(), 10);
    assert_eq!(params.selected_option(names::ISO).unwrap(), "400");
}

#[test]
fn clip_without_iso_keeps_first_option() {
    let mut clip = StubClip::new(4096, 2160).with_metadata("iso", AttributeValue::U32(0));
    clip.iso_list = vec![100, 200];
    let mut fx = Fixture::new(clip);
    fx.reader.set_file(CLIP).unwrap();
    assert_eq!(fx.reader.params().choice_index(names::ISO).unwrap(), 0);
}

#[test]
fn unreadable_clip_empties_option_lists() {
    let rt = StubRuntime::new()
        .with_clip(CLIP, StubClip::new(4096, 2160))
        .with_clip(OTHER, StubClip::corrupt());
    let mut fx = Fixture::with_runtime(rt);
    fx.reader.set_file(CLIP).unwrap();
    fx.reader.set_file(OTHER).unwrap();

    assert!(fx.reader.params().choice_options(names::GAMMA).unwrap().is_empty());
    assert_eq!(fx.reader.params().selected_option(names::ISO).unwrap(), "");
    assert!(!fx.reader.specs().is_usable());
}
