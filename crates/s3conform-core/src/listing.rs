//! Ground truth for paginated prefix/delimiter listings.
//!
//! Given the full set of keys in a bucket, [`ListingSimulator`] computes the
//! exact page a compliant server returns for a request, independently of any
//! server implementation.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{ConformError, Result};
use crate::key::ObjectKey;
use crate::key_order::{sort, OrderingDiscipline};
use crate::storage::{ListApi, ListObjectsParams};

/// Page size a server uses when the client does not send one.
pub const DEFAULT_MAX_KEYS: usize = 1000;

/// Opaque continuation position: the last raw key a page examined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListingCursor(ObjectKey);

impl ListingCursor {
    /// Cursor positioned after `key`.
    pub fn new(key: ObjectKey) -> Self {
        Self(key)
    }

    /// The last key examined by the page that produced this cursor.
    pub fn key(&self) -> &ObjectKey {
        &self.0
    }

    /// Encodes the cursor as a URL-safe continuation token.
    pub fn to_token(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Decodes a token produced by [`ListingCursor::to_token`].
    pub fn from_token(token: &str) -> Result<Self> {
        URL_SAFE_NO_PAD
            .decode(token)
            .map(|bytes| Self(ObjectKey::new(bytes)))
            .map_err(|_| ConformError::MalformedCursor {
                token: token.to_string(),
            })
    }
}

/// Parameters of one listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    /// Only keys starting with this prefix are listed; empty matches all
    pub prefix: ObjectKey,
    /// Keys containing this after the prefix collapse to a common prefix
    pub delimiter: Option<ObjectKey>,
    /// Maximum number of slots (entries plus common prefixes) per page
    pub max_keys: usize,
    /// List only keys sorting strictly after this one
    pub start_after: Option<ObjectKey>,
    /// Continuation from a previous page; takes precedence over `start_after`
    pub cursor: Option<ListingCursor>,
}

impl Default for ListingRequest {
    fn default() -> Self {
        Self {
            prefix: ObjectKey::default(),
            delimiter: None,
            max_keys: DEFAULT_MAX_KEYS,
            start_after: None,
            cursor: None,
        }
    }
}

impl ListingRequest {
    /// Sets the prefix.
    pub fn with_prefix(mut self, prefix: impl Into<ObjectKey>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets the delimiter.
    pub fn with_delimiter(mut self, delimiter: impl Into<ObjectKey>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Sets the page size.
    pub fn with_max_keys(mut self, max_keys: usize) -> Self {
        self.max_keys = max_keys;
        self
    }

    /// Sets the start-after marker.
    pub fn with_start_after(mut self, start_after: impl Into<ObjectKey>) -> Self {
        self.start_after = Some(start_after.into());
        self
    }

    /// Sets the continuation cursor.
    pub fn with_cursor(mut self, cursor: ListingCursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// The first-page request equivalent to a storage listing call. A V1
    /// `marker` bounds the listing exactly like V2 `start-after`. Service
    /// continuation tokens are opaque and are not carried over.
    pub fn from_params(params: &ListObjectsParams) -> Self {
        let start_after = match params.api {
            ListApi::V1 => params.marker.clone(),
            ListApi::V2 => params.start_after.clone(),
        };
        Self {
            prefix: params.prefix.clone().unwrap_or_default(),
            delimiter: params.delimiter.clone().filter(|d| !d.is_empty()),
            max_keys: params.max_keys.unwrap_or(DEFAULT_MAX_KEYS).min(DEFAULT_MAX_KEYS),
            start_after,
            cursor: None,
        }
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListingPage {
    /// Keys listed individually, in discipline order
    pub entries: Vec<ObjectKey>,
    /// Collapsed common prefixes, in discipline order
    pub common_prefixes: Vec<ObjectKey>,
    /// Whether eligible keys remain after this page
    pub truncated: bool,
    /// Where the next page starts; present iff `truncated`
    pub cursor: Option<ListingCursor>,
}

impl ListingPage {
    /// Number of slots the page occupies.
    pub fn slot_count(&self) -> usize {
        self.entries.len() + self.common_prefixes.len()
    }
}

/// Computes listing pages over a fixed key set.
#[derive(Debug, Clone)]
pub struct ListingSimulator {
    keys: Vec<ObjectKey>,
    discipline: OrderingDiscipline,
}

impl ListingSimulator {
    /// Builds a simulator over `keys`, sorted and deduplicated under `discipline`.
    pub fn new(keys: impl IntoIterator<Item = ObjectKey>, discipline: OrderingDiscipline) -> Self {
        let mut keys = sort(keys, discipline);
        keys.dedup();
        Self { keys, discipline }
    }

    /// The key set in listing order.
    pub fn keys(&self) -> &[ObjectKey] {
        &self.keys
    }

    /// The active ordering discipline.
    pub fn discipline(&self) -> OrderingDiscipline {
        self.discipline
    }

    /// Computes the page a compliant server returns for `request`.
    pub fn page(&self, request: &ListingRequest) -> ListingPage {
        debug_assert!(
            request.delimiter.as_ref().map_or(true, |d| !d.is_empty()),
            "listing delimiter must not be empty"
        );
        if request.max_keys == 0 {
            return ListingPage::default();
        }

        let lower = request
            .cursor
            .as_ref()
            .map(ListingCursor::key)
            .or(request.start_after.as_ref());
        let eligible: Vec<&ObjectKey> = self
            .keys
            .iter()
            .filter(|key| key.starts_with(&request.prefix))
            .filter(|key| lower.map_or(true, |l| self.discipline.compare(key, l).is_gt()))
            .collect();

        let mut page = ListingPage::default();
        let mut last_examined: Option<&ObjectKey> = None;
        let mut i = 0;
        while i < eligible.len() && page.slot_count() < request.max_keys {
            let key = eligible[i];
            match common_prefix_of(key, &request.prefix, request.delimiter.as_ref()) {
                Some(group) => {
                    while i < eligible.len()
                        && common_prefix_of(eligible[i], &request.prefix, request.delimiter.as_ref())
                            .as_ref()
                            == Some(&group)
                    {
                        last_examined = Some(eligible[i]);
                        i += 1;
                    }
                    page.common_prefixes.push(group);
                }
                None => {
                    page.entries.push(key.clone());
                    last_examined = Some(key);
                    i += 1;
                }
            }
        }

        page.truncated = i < eligible.len();
        if page.truncated {
            page.cursor = last_examined.cloned().map(ListingCursor::new);
        }
        page
    }

    /// Follows cursors from `request` until a page is not truncated.
    pub fn pages(&self, request: ListingRequest) -> Vec<ListingPage> {
        let mut pages = Vec::new();
        let mut request = request;
        loop {
            let page = self.page(&request);
            let next = page.cursor.clone();
            pages.push(page);
            match next {
                Some(cursor) => request.cursor = Some(cursor),
                None => return pages,
            }
        }
    }
}

/// The common prefix `key` collapses to, if its remainder after `prefix`
/// contains `delimiter`.
pub fn common_prefix_of(
    key: &ObjectKey,
    prefix: &ObjectKey,
    delimiter: Option<&ObjectKey>,
) -> Option<ObjectKey> {
    let delimiter = delimiter.filter(|d| !d.is_empty())?;
    let remainder = key.as_bytes().get(prefix.len()..)?;
    let needle = delimiter.as_bytes();
    let at = remainder.windows(needle.len()).position(|w| w == needle)?;
    Some(ObjectKey::new(&key.as_bytes()[..prefix.len() + at + needle.len()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<ObjectKey> {
        names.iter().map(|n| ObjectKey::from(*n)).collect()
    }

    fn simulator(names: &[&str]) -> ListingSimulator {
        ListingSimulator::new(keys(names), OrderingDiscipline::Utf8Binary)
    }

    #[test]
    fn test_grouping_example() {
        let sim = simulator(&["a", "b/", "b/0", "b/1", "c", "d/0", "e"]);
        let page = sim.page(&ListingRequest::default().with_delimiter("/"));
        assert_eq!(page.entries, keys(&["a", "c", "e"]));
        assert_eq!(page.common_prefixes, keys(&["b/", "d/"]));
        assert!(!page.truncated);
        assert_eq!(page.cursor, None);
    }

    #[test]
    fn test_group_absorbed_into_last_slot() {
        let sim = simulator(&["a", "b/", "b/0", "b/1", "c"]);
        let page = sim.page(&ListingRequest::default().with_delimiter("/").with_max_keys(2));
        assert_eq!(page.entries, keys(&["a"]));
        assert_eq!(page.common_prefixes, keys(&["b/"]));
        assert!(page.truncated);
        assert_eq!(page.cursor, Some(ListingCursor::new("b/1".into())));

        let next = sim.page(
            &ListingRequest::default()
                .with_delimiter("/")
                .with_max_keys(2)
                .with_cursor(page.cursor.unwrap()),
        );
        assert_eq!(next.entries, keys(&["c"]));
        assert!(next.common_prefixes.is_empty());
        assert!(!next.truncated);
    }

    #[test]
    fn test_prefix_filter_and_key_equal_to_prefix() {
        let sim = simulator(&["a", "b/", "b/0", "b/1/x", "c"]);
        let page = sim.page(&ListingRequest::default().with_prefix("b/").with_delimiter("/"));
        assert_eq!(page.entries, keys(&["b/", "b/0"]));
        assert_eq!(page.common_prefixes, keys(&["b/1/"]));
    }

    #[test]
    fn test_exactly_full_page_is_not_truncated() {
        let sim = simulator(&["a", "b"]);
        let page = sim.page(&ListingRequest::default().with_max_keys(2));
        assert_eq!(page.entries.len(), 2);
        assert!(!page.truncated);
    }

    #[test]
    fn test_start_after_non_existing_key() {
        let sim = simulator(&["180", "190", "200"]);
        let page = sim.page(&ListingRequest::default().with_start_after("185").with_max_keys(1));
        assert_eq!(page.entries, keys(&["190"]));
        assert!(page.truncated);
    }

    #[test]
    fn test_cursor_takes_precedence_over_start_after() {
        let sim = simulator(&["a", "b", "c"]);
        let page = sim.page(
            &ListingRequest::default()
                .with_start_after("a")
                .with_cursor(ListingCursor::new("b".into())),
        );
        assert_eq!(page.entries, keys(&["c"]));
    }

    #[test]
    fn test_max_keys_zero() {
        let sim = simulator(&["a"]);
        let page = sim.page(&ListingRequest::default().with_max_keys(0));
        assert_eq!(page, ListingPage::default());
    }

    #[test]
    fn test_pages_concatenate_to_full_listing() {
        let names: Vec<String> = (0..10).map(|i| format!("k{:02}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let sim = simulator(&refs);
        let pages = sim.pages(ListingRequest::default().with_max_keys(3));
        assert_eq!(pages.len(), 4);
        let all: Vec<ObjectKey> = pages.into_iter().flat_map(|p| p.entries).collect();
        assert_eq!(all, keys(&refs));
    }

    #[test]
    fn test_duplicates_are_removed() {
        let sim = simulator(&["a", "a", "b"]);
        assert_eq!(sim.keys(), keys(&["a", "b"]).as_slice());
    }

    #[test]
    fn test_cursor_token_round_trip() {
        let cursor = ListingCursor::new(ObjectKey::new(vec![0xFF, b'/', 0x00]));
        let token = cursor.to_token();
        assert_eq!(ListingCursor::from_token(&token), Ok(cursor));
        assert!(ListingCursor::from_token("not base64!").is_err());
    }

    fn numbered(dir: &str, range: std::ops::Range<usize>) -> Vec<ObjectKey> {
        range.map(|i| ObjectKey::from(format!("{}{}", dir, i))).collect()
    }

    /// `a`, `a/b/0..9`, `a/c/0..9` and `a/d`.
    fn tree() -> ListingSimulator {
        let mut names = keys(&["a", "a/d"]);
        names.extend(numbered("a/b/", 0..10));
        names.extend(numbered("a/c/", 0..10));
        ListingSimulator::new(names, OrderingDiscipline::Utf8Binary)
    }

    #[test]
    fn test_tree_groups_directories_under_prefix() {
        let page = tree().page(
            &ListingRequest::default()
                .with_prefix("a/")
                .with_delimiter("/")
                .with_max_keys(10),
        );
        assert_eq!(page.entries, keys(&["a/d"]));
        assert_eq!(page.common_prefixes, keys(&["a/b/", "a/c/"]));
        assert!(!page.truncated);
    }

    #[test]
    fn test_tree_nested_prefix_lists_leaf_keys() {
        let page = tree().page(
            &ListingRequest::default()
                .with_prefix("a/b/")
                .with_delimiter("/")
                .with_max_keys(10),
        );
        assert_eq!(page.entries, numbered("a/b/", 0..10));
        assert!(page.common_prefixes.is_empty());
        assert!(!page.truncated);
    }

    #[test]
    fn test_tree_prefix_without_delimiter_pages_by_ten() {
        let pages = tree().pages(ListingRequest::default().with_prefix("a/").with_max_keys(10));
        let entries: Vec<Vec<ObjectKey>> = pages.iter().map(|p| p.entries.clone()).collect();
        assert_eq!(
            entries,
            vec![numbered("a/b/", 0..10), numbered("a/c/", 0..10), keys(&["a/d"])]
        );
        assert!(pages.iter().all(|p| p.common_prefixes.is_empty()));
    }

    #[test]
    fn test_tree_slash_prefix_is_empty() {
        let page = tree().page(&ListingRequest::default().with_prefix("/").with_delimiter("/"));
        assert_eq!(page, ListingPage::default());
    }

    #[test]
    fn test_more_prefixes_than_max_keys() {
        let mut names = Vec::new();
        for i in 0..15u8 {
            names.push(ObjectKey::from(format!("a/{}", i)));
            names.push(ObjectKey::from(format!("a/{}/b", i)));
            names.push(ObjectKey::from(format!("a/{}/{}", char::from(b'b' + i), i)));
        }
        let sim = ListingSimulator::new(names, OrderingDiscipline::Utf8Binary);
        let pages = sim.pages(
            ListingRequest::default()
                .with_prefix("a/")
                .with_delimiter("/")
                .with_max_keys(10),
        );

        let expected: [(&[&str], &[&str]); 5] = [
            (
                &["a/0", "a/1", "a/10", "a/11", "a/12"],
                &["a/0/", "a/1/", "a/10/", "a/11/", "a/12/"],
            ),
            (
                &["a/13", "a/14", "a/2", "a/3", "a/4"],
                &["a/13/", "a/14/", "a/2/", "a/3/", "a/4/"],
            ),
            (
                &["a/5", "a/6", "a/7", "a/8", "a/9"],
                &["a/5/", "a/6/", "a/7/", "a/8/", "a/9/"],
            ),
            (
                &[],
                &["a/b/", "a/c/", "a/d/", "a/e/", "a/f/", "a/g/", "a/h/", "a/i/", "a/j/", "a/k/"],
            ),
            (&[], &["a/l/", "a/m/", "a/n/", "a/o/", "a/p/"]),
        ];
        assert_eq!(pages.len(), expected.len());
        for (i, (page, (entries, prefixes))) in pages.iter().zip(expected).enumerate() {
            assert_eq!(page.entries, keys(entries), "page {}", i + 1);
            assert_eq!(page.common_prefixes, keys(prefixes), "page {}", i + 1);
            assert_eq!(page.truncated, i + 1 < expected.len());
        }
    }

    #[test]
    fn test_top_level_groups_with_large_directories() {
        let mut names = keys(&["a", "d"]);
        names.extend(numbered("b/", 0..500));
        names.extend(numbered("c/", 0..500));
        let sim = ListingSimulator::new(names, OrderingDiscipline::Utf8Binary);
        let page = sim.page(&ListingRequest::default().with_delimiter("/").with_max_keys(10));
        assert_eq!(page.entries, keys(&["a", "d"]));
        assert_eq!(page.common_prefixes, keys(&["b/", "c/"]));
        assert!(!page.truncated);
    }

    #[test]
    fn test_prefix_matching_object_key_lists_it_first() {
        let mut names = keys(&["a", "b/", "d"]);
        names.extend(numbered("b/", 0..200));
        names.extend(numbered("c/", 0..10));
        let sim = ListingSimulator::new(names, OrderingDiscipline::Utf8Binary);
        let page = sim.page(
            &ListingRequest::default()
                .with_prefix("b/")
                .with_delimiter("/")
                .with_max_keys(10),
        );
        assert_eq!(
            page.entries,
            keys(&["b/", "b/0", "b/1", "b/10", "b/100", "b/101", "b/102", "b/103", "b/104", "b/105"])
        );
        assert!(page.truncated);
    }

    #[test]
    fn test_single_directory_object_is_common_prefix() {
        let sim = simulator(&["b/"]);
        let page = sim.page(&ListingRequest::default().with_prefix("").with_delimiter("/"));
        assert!(page.entries.is_empty());
        assert_eq!(page.common_prefixes, keys(&["b/"]));
    }

    #[test]
    fn test_request_from_params() {
        let v2 = ListObjectsParams {
            prefix: Some(ObjectKey::from("a/")),
            delimiter: Some(ObjectKey::from("/")),
            max_keys: Some(5),
            start_after: Some(ObjectKey::from("a/b")),
            marker: Some(ObjectKey::from("ignored")),
            ..Default::default()
        };
        let request = ListingRequest::from_params(&v2);
        assert_eq!(request.prefix, ObjectKey::from("a/"));
        assert_eq!(request.max_keys, 5);
        assert_eq!(request.start_after, Some(ObjectKey::from("a/b")));

        let v1 = ListObjectsParams {
            api: ListApi::V1,
            marker: Some(ObjectKey::from("m")),
            start_after: Some(ObjectKey::from("ignored")),
            delimiter: Some(ObjectKey::default()),
            ..Default::default()
        };
        let request = ListingRequest::from_params(&v1);
        assert_eq!(request.start_after, Some(ObjectKey::from("m")));
        assert_eq!(request.delimiter, None);
        assert_eq!(request.max_keys, DEFAULT_MAX_KEYS);
    }

    #[test]
    fn test_multi_byte_delimiter() {
        let sim = simulator(&["a--b", "a--c", "ab"]);
        let page = sim.page(&ListingRequest::default().with_delimiter("--"));
        assert_eq!(page.common_prefixes, keys(&["a--"]));
        assert_eq!(page.entries, keys(&["ab"]));
    }
}
