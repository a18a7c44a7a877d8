//! Range-checked, cached loading of scan matrices.

use crate::{ScanMatrix, ScanQuery, ScanSource, SurfaceError};
use dashmap::DashMap;
use hscan::{ScanId, SegId, SAMPLES_PER_SCAN};
use log::debug;
use std::{ops::RangeInclusive, sync::Arc};

/// Scan ids known to the backing store.
pub const DEFAULT_ID_BOUNDS: RangeInclusive<ScanId> = 1..=90_000;

/// Most scans a single id range may cover.
pub const DEFAULT_MAX_SPAN: u32 = 4_500;

/// Loads [`ScanMatrix`]es from a [`ScanSource`].
///
/// Matrices are cached by query. Concurrent requests for the same
/// query wait on a single fetch rather than each querying the source.
///
/// The wait is a cache shard lock held across the source query and the
/// parse, so while a matrix is loading, other queries hashing to the
/// same shard (cached or not, including [`forget`](Self::forget)) also
/// wait for it.
pub struct ScanMatrixExtractor<S> {
    source: S,

    /// Samples per scan.
    columns: usize,

    /// Ids an id range may start or end on.
    id_bounds: RangeInclusive<ScanId>,

    /// Widest id range allowed.
    max_span: u32,

    /// Matrices which have been loaded on demand.
    cache: DashMap<ScanQuery, Arc<ScanMatrix>>,
}

impl<S> ScanMatrixExtractor<S> {
    pub fn builder() -> ScanMatrixExtractorBuilder<S> {
        ScanMatrixExtractorBuilder {
            source: None,
            columns: SAMPLES_PER_SCAN,
            id_bounds: DEFAULT_ID_BOUNDS,
            max_span: DEFAULT_MAX_SPAN,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn columns(&self) -> usize {
        self.columns
    }
}

impl<S: ScanSource> ScanMatrixExtractor<S> {
    /// Returns the matrix of scans `id_min..=id_max`.
    pub fn load(&self, id_min: ScanId, id_max: ScanId) -> Result<Arc<ScanMatrix>, SurfaceError> {
        self.fetch(ScanQuery::IdRange {
            min: id_min,
            max: id_max,
        })
    }

    /// Returns the matrix of every scan in segment `seg_id`.
    pub fn load_segment(&self, seg_id: SegId) -> Result<Arc<ScanMatrix>, SurfaceError> {
        self.fetch(ScanQuery::Segment(seg_id))
    }

    /// Returns the matrix answering `query`, querying the source only
    /// if it isn't already cached.
    pub fn fetch(&self, query: ScanQuery) -> Result<Arc<ScanMatrix>, SurfaceError> {
        self.validate(query)?;
        self.cache
            .entry(query)
            .or_try_insert_with(|| self.build_matrix(query).map(Arc::new))
            .map(|r| r.clone())
    }

    /// Drops the cached matrix for `query`, if any.
    pub fn forget(&self, query: &ScanQuery) -> Option<Arc<ScanMatrix>> {
        self.cache.remove(query).map(|(_, matrix)| matrix)
    }
}

/// Private API.
impl<S: ScanSource> ScanMatrixExtractor<S> {
    fn validate(&self, query: ScanQuery) -> Result<(), SurfaceError> {
        let ScanQuery::IdRange { min, max } = query else {
            return Ok(());
        };
        if min > max {
            return Err(SurfaceError::InvalidRange(format!(
                "id start {min} is after id end {max}"
            )));
        }
        if !self.id_bounds.contains(&min) || !self.id_bounds.contains(&max) {
            return Err(SurfaceError::InvalidRange(format!(
                "ids must lie within {}..={}",
                self.id_bounds.start(),
                self.id_bounds.end()
            )));
        }
        let span = u64::from(max - min) + 1;
        if span > u64::from(self.max_span) {
            return Err(SurfaceError::InvalidRange(format!(
                "{span} scans requested, at most {} allowed",
                self.max_span
            )));
        }
        Ok(())
    }

    fn build_matrix(&self, query: ScanQuery) -> Result<ScanMatrix, SurfaceError> {
        let (rows, fetch_runtime) = {
            let now = std::time::Instant::now();
            let rows = self
                .source
                .fetch(&query)
                .map_err(SurfaceError::data_source)?;
            (rows, now.elapsed())
        };
        let n_rows = rows.len();

        let (matrix, parse_runtime) = {
            let now = std::time::Instant::now();
            let matrix = ScanMatrix::from_rows(query, rows, self.columns)?;
            (matrix, now.elapsed())
        };

        debug!(
            "matrix; query: {query}, rows: {n_rows}, fetch_exec: {fetch_runtime:?}, parse_exec: {parse_runtime:?}"
        );

        Ok(matrix)
    }
}

pub struct ScanMatrixExtractorBuilder<S> {
    /// Where scan rows come from (required).
    source: Option<S>,

    /// Samples per scan (defaults to [`SAMPLES_PER_SCAN`]).
    columns: usize,

    /// Ids an id range may start or end on (defaults to
    /// [`DEFAULT_ID_BOUNDS`]).
    id_bounds: RangeInclusive<ScanId>,

    /// Widest id range allowed (defaults to [`DEFAULT_MAX_SPAN`]).
    max_span: u32,
}

impl<S> ScanMatrixExtractorBuilder<S> {
    /// Where scan rows come from (required).
    #[must_use]
    pub fn source(mut self, source: S) -> Self {
        self.source = Some(source);
        self
    }

    /// Samples per scan (defaults to [`SAMPLES_PER_SCAN`]).
    #[must_use]
    pub fn columns(mut self, columns: usize) -> Self {
        self.columns = columns;
        self
    }

    /// Ids an id range may start or end on (defaults to
    /// [`DEFAULT_ID_BOUNDS`]).
    #[must_use]
    pub fn id_bounds(mut self, id_bounds: RangeInclusive<ScanId>) -> Self {
        self.id_bounds = id_bounds;
        self
    }

    /// Widest id range allowed (defaults to [`DEFAULT_MAX_SPAN`]).
    #[must_use]
    pub fn max_span(mut self, max_span: u32) -> Self {
        self.max_span = max_span;
        self
    }

    pub fn build(self) -> Result<ScanMatrixExtractor<S>, SurfaceError> {
        let source = self.source.ok_or(SurfaceError::Builder("source"))?;
        if self.columns == 0 {
            return Err(SurfaceError::Builder("columns"));
        }
        if self.max_span == 0 {
            return Err(SurfaceError::Builder("max_span"));
        }
        Ok(ScanMatrixExtractor {
            source,
            columns: self.columns,
            id_bounds: self.id_bounds,
            max_span: self.max_span,
            cache: DashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::ScanMatrixExtractor;
    use crate::{
        source::fixtures::scan, MemSource, ScanQuery, ScanSource, SurfaceError,
    };
    use hscan::{ScanRow, SAMPLES_PER_SCAN};
    use std::{
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
    };

    /// Counts how many times it was queried.
    struct Counting {
        inner: MemSource,
        fetches: AtomicUsize,
    }

    impl ScanSource for Counting {
        type Error = std::convert::Infallible;

        fn fetch(&self, query: &ScanQuery) -> Result<Vec<ScanRow>, Self::Error> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(query)
        }
    }

    struct Offline;

    impl ScanSource for Offline {
        type Error = io::Error;

        fn fetch(&self, _query: &ScanQuery) -> Result<Vec<ScanRow>, io::Error> {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "offline"))
        }
    }

    fn counting(ids: std::ops::RangeInclusive<u32>) -> ScanMatrixExtractor<Counting> {
        let inner = MemSource::new(ids.map(|id| scan(id, id / 900 + 1, SAMPLES_PER_SCAN)));
        ScanMatrixExtractor::builder()
            .source(Counting {
                inner,
                fetches: AtomicUsize::new(0),
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_load_shape() {
        let extractor = counting(1..=120);
        let matrix = extractor.load(11, 60).unwrap();
        assert_eq!(matrix.rows(), 50);
        assert_eq!(matrix.columns(), SAMPLES_PER_SCAN);
        assert_eq!(matrix.ids(), (11..=60).collect::<Vec<_>>());
    }

    #[test]
    fn test_load_partial_range() {
        let extractor = counting(1..=10);
        let matrix = extractor.load(5, 500).unwrap();
        assert_eq!(matrix.ids(), (5..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_load_segment() {
        let extractor = counting(890..=910);
        let matrix = extractor.load_segment(2).unwrap();
        assert_eq!(matrix.ids(), (900..=910).collect::<Vec<_>>());
        assert_eq!(matrix.query(), ScanQuery::Segment(2));
    }

    #[test]
    fn test_empty_range() {
        let extractor = counting(1..=10);
        assert!(matches!(
            extractor.load(20, 30),
            Err(SurfaceError::EmptyRange(ScanQuery::IdRange { min: 20, max: 30 }))
        ));
        assert!(matches!(
            extractor.load_segment(9),
            Err(SurfaceError::EmptyRange(ScanQuery::Segment(9)))
        ));
    }

    #[test]
    fn test_invalid_ranges_skip_source() {
        let extractor = counting(1..=10);
        for (min, max) in [(5, 4), (0, 3), (89_999, 90_001), (1, 4_501)] {
            assert!(
                matches!(extractor.load(min, max), Err(SurfaceError::InvalidRange(_))),
                "{min}..={max}"
            );
        }
        assert_eq!(extractor.source().fetches.load(Ordering::SeqCst), 0);
        assert!(extractor.load(1, 4_500).is_ok());
        assert!(extractor.load(90_000, 90_000).is_err());
    }

    #[test]
    fn test_custom_bounds() {
        let extractor = ScanMatrixExtractor::builder()
            .source(MemSource::new((1..=10).map(|id| scan(id, 1, 4))))
            .columns(4)
            .id_bounds(1..=10)
            .max_span(3)
            .build()
            .unwrap();
        assert_eq!(extractor.columns(), 4);
        assert_eq!(extractor.load(2, 4).unwrap().rows(), 3);
        assert!(matches!(
            extractor.load(2, 5),
            Err(SurfaceError::InvalidRange(_))
        ));
        assert!(matches!(
            extractor.load(10, 11),
            Err(SurfaceError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_malformed_row() {
        let mut rows: Vec<_> = (1..=3).map(|id| scan(id, 1, SAMPLES_PER_SCAN)).collect();
        rows[1] = scan(2, 1, SAMPLES_PER_SCAN - 1);
        let extractor = ScanMatrixExtractor::builder()
            .source(MemSource::new(rows))
            .build()
            .unwrap();
        assert!(matches!(
            extractor.load(1, 3),
            Err(SurfaceError::MalformedRow { id: 2, .. })
        ));
        // A rejected range is not cached.
        assert!(extractor.forget(&ScanQuery::IdRange { min: 1, max: 3 }).is_none());
        assert_eq!(extractor.load(3, 3).unwrap().rows(), 1);
    }

    #[test]
    fn test_data_source_error_propagates() {
        let extractor = ScanMatrixExtractor::builder()
            .source(Offline)
            .build()
            .unwrap();
        match extractor.load(1, 2) {
            Err(SurfaceError::DataSource(e)) => assert_eq!(e.to_string(), "offline"),
            other => panic!("expected data source error, got {other:?}"),
        }
    }

    #[test]
    fn test_cache() {
        let extractor = counting(1..=100);
        let a = extractor.load(1, 50).unwrap();
        let b = extractor.load(1, 50).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(extractor.source().fetches.load(Ordering::SeqCst), 1);

        extractor.load(2, 50).unwrap();
        assert_eq!(extractor.source().fetches.load(Ordering::SeqCst), 2);

        let forgotten = extractor
            .forget(&ScanQuery::IdRange { min: 1, max: 50 })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &forgotten));
        let c = extractor.load(1, 50).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*a, *c);
        assert_eq!(extractor.source().fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_single_flight() {
        let extractor = Arc::new(counting(1..=200));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let extractor = Arc::clone(&extractor);
                thread::spawn(move || extractor.load(1, 200).unwrap())
            })
            .collect();
        let matrices: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(extractor.source().fetches.load(Ordering::SeqCst), 1);
        assert!(matrices.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn test_builder_requires_source() {
        assert!(matches!(
            ScanMatrixExtractor::<MemSource>::builder().build(),
            Err(SurfaceError::Builder("source"))
        ));
        assert!(matches!(
            ScanMatrixExtractor::builder()
                .source(MemSource::default())
                .columns(0)
                .build(),
            Err(SurfaceError::Builder("columns"))
        ));
    }
}
