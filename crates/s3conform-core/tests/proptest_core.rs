//! Property-based tests for s3conform-core using proptest.
//!
//! These cover the invariants the ground-truth components must hold for
//! arbitrary input: header round-trips, range resolution bounds, total key
//! orders, and listing pagination continuity.

use std::cmp::Ordering;

use proptest::prelude::*;
use s3conform_core::{
    codepoint::raw_utf8,
    key_order::{classify_utf8, compare_utf16_binary, compare_utf8_binary},
    range::BYTES_UNIT,
    ByteRangeRequest, ByteRangeResponse, ListingRequest, ListingSimulator, ObjectKey,
    OrderingDiscipline, RangeSpec, Resolution,
};

fn any_range_spec() -> impl Strategy<Value = RangeSpec> {
    prop_oneof![
        (any::<u64>(), any::<u64>()).prop_map(|(a, b)| {
            RangeSpec::bounded(a.min(b), a.max(b)).expect("ordered bounds")
        }),
        any::<u64>().prop_map(RangeSpec::from_start),
        any::<u64>().prop_map(RangeSpec::suffix),
    ]
}

fn any_request() -> impl Strategy<Value = ByteRangeRequest> {
    (
        prop_oneof![Just("bytes".to_string()), "[a-z]{1,8}"],
        proptest::collection::vec(any_range_spec(), 1..5),
    )
        .prop_map(|(unit, specs)| ByteRangeRequest::new(&unit, specs).expect("valid request"))
}

fn any_response() -> impl Strategy<Value = ByteRangeResponse> {
    prop_oneof![
        any::<u64>().prop_map(|size| ByteRangeResponse::unsatisfied(BYTES_UNIT, size).unwrap()),
        (any::<u64>(), any::<u64>(), proptest::option::of(any::<u64>())).prop_map(
            |(a, b, size)| {
                ByteRangeResponse::new(BYTES_UNIT, Some(a.min(b)), Some(a.max(b)), size).unwrap()
            }
        ),
    ]
}

/// Keys over a small alphabet so that prefixes, delimiters and collisions
/// actually occur, including characters on both sides of the surrogate block.
fn any_key() -> impl Strategy<Value = ObjectKey> {
    proptest::collection::vec(
        prop_oneof![
            Just('a'),
            Just('b'),
            Just('/'),
            Just('\u{0}'),
            Just('\u{FB80}'),
            Just('\u{1F44F}'),
        ],
        0..6,
    )
    .prop_map(|chars| ObjectKey::from(chars.into_iter().collect::<String>()))
}

fn any_discipline() -> impl Strategy<Value = OrderingDiscipline> {
    prop_oneof![
        Just(OrderingDiscipline::Utf8Binary),
        Just(OrderingDiscipline::Utf16Binary)
    ]
}

proptest! {
    #[test]
    fn test_range_request_round_trip(request in any_request()) {
        let header = request.to_string();
        prop_assert_eq!(ByteRangeRequest::parse(&header), Some(request));
    }

    #[test]
    fn test_content_range_round_trip(response in any_response()) {
        let header = response.to_string();
        prop_assert_eq!(ByteRangeResponse::parse(&header), Some(response));
    }

    #[test]
    fn test_parse_never_panics(header in ".{0,40}") {
        let _ = ByteRangeRequest::parse(&header);
        let _ = ByteRangeResponse::parse(&header);
    }

    #[test]
    fn test_resolution_stays_inside_object(spec in any_range_spec(), size in 0u64..10_000) {
        match spec.resolve(size) {
            Resolution::Satisfiable(span) => {
                prop_assert!(span.start() <= span.end());
                prop_assert!(span.end() < size);
                prop_assert!(span.len() <= size);
                let content_range = span.content_range(BYTES_UNIT, size).unwrap();
                prop_assert_eq!(content_range.size(), Some(size));
            }
            Resolution::Unsatisfiable => {
                let start_past_end = spec.start().map_or(false, |s| s >= size);
                let empty_suffix = spec.start().is_none() && (size == 0 || spec.end() == Some(0));
                prop_assert!(start_past_end || empty_suffix);
            }
        }
    }

    #[test]
    fn test_slice_length_matches_span(spec in any_range_spec(), data in proptest::collection::vec(any::<u8>(), 0..256)) {
        if let Some(span) = spec.resolve(data.len() as u64).span() {
            let slice = span.slice(&data).expect("span inside data");
            prop_assert_eq!(slice.len() as u64, span.len());
        }
    }

    #[test]
    fn test_utf8_binary_is_byte_order(a in proptest::collection::vec(any::<u8>(), 0..12), b in proptest::collection::vec(any::<u8>(), 0..12)) {
        prop_assert_eq!(compare_utf8_binary(&a, &b), a.cmp(&b));
    }

    #[test]
    fn test_utf16_order_is_antisymmetric(a in proptest::collection::vec(any::<u8>(), 0..12), b in proptest::collection::vec(any::<u8>(), 0..12)) {
        prop_assert_eq!(compare_utf16_binary(&a, &b), compare_utf16_binary(&b, &a).reverse());
        if compare_utf16_binary(&a, &b) == Ordering::Equal {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn test_utf16_order_matches_std_for_valid_text(a in "\\PC{0,8}", b in "\\PC{0,8}") {
        let expected = a.encode_utf16().cmp(b.encode_utf16());
        prop_assert_eq!(compare_utf16_binary(a.as_bytes(), b.as_bytes()), expected);
    }

    #[test]
    fn test_classify_agrees_with_std(bytes in proptest::collection::vec(any::<u8>(), 0..16)) {
        prop_assert_eq!(classify_utf8(&bytes).is_valid(), std::str::from_utf8(&bytes).is_ok());
    }

    #[test]
    fn test_raw_utf8_matches_char_encoding(c in any::<char>()) {
        prop_assert_eq!(raw_utf8(c as u32), c.to_string().into_bytes());
    }

    #[test]
    fn test_pagination_continuity(
        keys in proptest::collection::vec(any_key(), 0..30),
        prefix in prop_oneof![Just(""), Just("a"), Just("b/")],
        delimited in any::<bool>(),
        page_size in 1usize..5,
        discipline in any_discipline(),
    ) {
        let sim = ListingSimulator::new(keys, discipline);
        let mut base = ListingRequest::default().with_prefix(prefix);
        if delimited {
            base = base.with_delimiter("/");
        }
        let full = sim.page(&base.clone().with_max_keys(usize::MAX));
        prop_assert!(!full.truncated);

        let pages = sim.pages(base.with_max_keys(page_size));
        let last = pages.len() - 1;
        for (i, page) in pages.iter().enumerate() {
            prop_assert!(page.slot_count() <= page_size);
            prop_assert_eq!(page.truncated, i != last);
            prop_assert_eq!(page.cursor.is_some(), page.truncated);
            if page.truncated {
                prop_assert_eq!(page.slot_count(), page_size);
            }
        }

        let entries: Vec<ObjectKey> = pages.iter().flat_map(|p| p.entries.clone()).collect();
        let prefixes: Vec<ObjectKey> = pages.iter().flat_map(|p| p.common_prefixes.clone()).collect();
        prop_assert_eq!(entries, full.entries);
        prop_assert_eq!(prefixes, full.common_prefixes);
    }

    #[test]
    fn test_listing_is_idempotent(
        keys in proptest::collection::vec(any_key(), 0..20),
        page_size in 0usize..6,
        discipline in any_discipline(),
    ) {
        let sim = ListingSimulator::new(keys, discipline);
        let request = ListingRequest::default().with_delimiter("/").with_max_keys(page_size);
        prop_assert_eq!(sim.page(&request), sim.page(&request));
    }

    #[test]
    fn test_listing_entries_are_sorted(keys in proptest::collection::vec(any_key(), 0..20), discipline in any_discipline()) {
        let sim = ListingSimulator::new(keys, discipline);
        let page = sim.page(&ListingRequest::default());
        for pair in page.entries.windows(2) {
            prop_assert_eq!(discipline.compare(&pair[0], &pair[1]), Ordering::Less);
        }
    }
}
