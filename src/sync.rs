//! Keeps the live pin set equal to the latest filtered subset.
//!
//! Requests land in a single slot; only the newest one is ever built. A cycle
//! tears down every pin of the previous cycle before it constructs a new one,
//! then installs the new set into the cluster layer in one batch.

use crate::city::City;
use crate::sdk::{
    ClusterId, ClusterRegistry, MarkerFactory, MarkerId, PinFactory, PinStyle, ReadyMap,
};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ActivePin {
    pub marker: MarkerId,
    pub city: City,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub generation: u64,
    pub retired: usize,
    pub built: usize,
}

pub struct MarkerSynchronizer {
    style: PinStyle,
    latest: Option<(u64, Vec<City>)>,
    next_generation: u64,
    settled_generation: Option<u64>,
    cluster: Option<ClusterId>,
    pins: Vec<ActivePin>,
    by_marker: FxHashMap<MarkerId, usize>,
}

impl MarkerSynchronizer {
    pub fn new(style: PinStyle) -> Self {
        Self {
            style,
            latest: None,
            next_generation: 1,
            settled_generation: None,
            cluster: None,
            pins: Vec::new(),
            by_marker: FxHashMap::default(),
        }
    }

    /// Stores `subset` as the newest request, dropping any unsettled one.
    pub fn request(&mut self, subset: Vec<City>) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        if let Some((stale, _)) = self.latest.replace((generation, subset)) {
            tracing::trace!("request {stale} superseded by {generation} before it settled");
        }
        generation
    }

    pub fn has_pending(&self) -> bool {
        self.latest.is_some()
    }

    pub fn settled_generation(&self) -> Option<u64> {
        self.settled_generation
    }

    /// Runs one teardown-build-install cycle for the newest request, if any.
    pub fn settle<S>(&mut self, sdk: &mut S, map: ReadyMap) -> Option<SyncReport>
    where
        S: PinFactory + MarkerFactory + ClusterRegistry,
    {
        let (generation, subset) = self.latest.take()?;

        let retired = self.teardown(sdk);

        let mut markers = Vec::with_capacity(subset.len());
        for city in subset {
            let pin = sdk.create_pin(&city.glyph(), &self.style);
            let marker = sdk.create_marker(city.position, pin, true);
            self.by_marker.insert(marker, self.pins.len());
            self.pins.push(ActivePin { marker, city });
            markers.push(marker);
        }

        let cluster = *self.cluster.get_or_insert_with(|| sdk.create_cluster(map.id()));
        sdk.add_markers(cluster, &markers);

        self.settled_generation = Some(generation);
        let report = SyncReport { generation, retired, built: markers.len() };
        tracing::debug!(
            "sync #{generation}: retired {retired} pins, built {}, cluster holds {}",
            report.built,
            sdk.cluster_len(cluster)
        );
        Some(report)
    }

    /// Unregisters and destroys every live pin. Returns how many were removed.
    pub fn teardown<S>(&mut self, sdk: &mut S) -> usize
    where
        S: MarkerFactory + ClusterRegistry,
    {
        if let Some(cluster) = self.cluster {
            sdk.clear_markers(cluster);
        }
        let retired = self.pins.len();
        for pin in self.pins.drain(..) {
            sdk.remove_marker(pin.marker);
        }
        self.by_marker.clear();
        retired
    }

    pub fn city_for(&self, marker: MarkerId) -> Option<&City> {
        self.by_marker.get(&marker).map(|&idx| &self.pins[idx].city)
    }

    pub fn is_live(&self, marker: MarkerId) -> bool {
        self.by_marker.contains_key(&marker)
    }

    pub fn pins(&self) -> &[ActivePin] {
        &self.pins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::city::Position;
    use crate::filter::filter;
    use crate::scene::{Scene, SceneOp};
    use crate::sdk::{MapFactory, MapOptions};
    use std::collections::HashSet;

    fn setup() -> (Scene, ReadyMap) {
        let mut scene = Scene::with_journal();
        let map = scene.create_map(&MapOptions {
            map_id: "T".into(),
            center: Position::new(-31.5, 147.1),
            zoom: 7.0,
        });
        (scene, ReadyMap::new(map))
    }

    fn cities() -> Vec<City> {
        vec![
            City::new("Sydney", -33.87, 151.21),
            City::new("Dubbo", -32.26, 148.60),
            City::new("Bathurst", -33.42, 149.58),
            City::new("Orange", -33.28, 149.10),
        ]
    }

    fn assert_consistent(sync: &MarkerSynchronizer, scene: &Scene, map: ReadyMap, subset: &[City]) {
        assert_eq!(sync.pins().len(), subset.len());
        assert_eq!(scene.live_marker_count(), subset.len());
        assert_eq!(scene.attached_count(map.id()), subset.len());
        let (cluster, _) = scene.clusters_on(map.id()).next().unwrap();
        assert_eq!(scene.cluster_len(cluster), subset.len());
        let markers: HashSet<_> = sync.pins().iter().map(|p| p.marker).collect();
        assert_eq!(markers.len(), subset.len());
        for (pin, city) in sync.pins().iter().zip(subset) {
            assert_eq!(&pin.city, city);
            assert_eq!(scene.marker(pin.marker).unwrap().content.glyph, city.glyph());
        }
    }

    #[test]
    fn test_one_pin_per_city() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        let all = cities();
        assert_eq!(sync.request(all.clone()), 1);
        let report = sync.settle(&mut scene, map).unwrap();
        assert_eq!(report, SyncReport { generation: 1, retired: 0, built: 4 });
        assert_consistent(&sync, &scene, map, &all);
        assert!(!sync.has_pending());
        assert!(sync.settle(&mut scene, map).is_none());
    }

    #[test]
    fn test_refilter_replaces_pins_without_orphans() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        let all = cities();
        sync.request(all.clone());
        sync.settle(&mut scene, map);
        let old: Vec<_> = sync.pins().iter().map(|p| p.marker).collect();

        let subset = filter(&all, "ur");
        sync.request(subset.clone());
        let report = sync.settle(&mut scene, map).unwrap();
        assert_eq!(report.retired, 4);
        assert_eq!(report.built, 1);
        assert_consistent(&sync, &scene, map, &subset);
        for marker in old {
            assert!(scene.marker(marker).is_none());
            assert!(sync.city_for(marker).is_none());
        }
    }

    #[test]
    fn test_teardown_precedes_construction() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        sync.request(cities());
        sync.settle(&mut scene, map);
        scene.clear_journal();

        sync.request(cities());
        sync.settle(&mut scene, map);
        let journal = scene.journal();
        let first_create =
            journal.iter().position(|op| matches!(op, SceneOp::CreateMarker(_))).unwrap();
        let last_removal = journal
            .iter()
            .rposition(|op| matches!(op, SceneOp::RemoveMarker(_) | SceneOp::ClearCluster(_)))
            .unwrap();
        assert!(last_removal < first_create);
        assert!(matches!(journal[0], SceneOp::ClearCluster(_)));
        // Install is a single batch at the end.
        assert!(matches!(journal.last(), Some(SceneOp::AddToCluster(_, 4))));
        let batches = journal.iter().filter(|op| matches!(op, SceneOp::AddToCluster(..))).count();
        assert_eq!(batches, 1);
    }

    #[test]
    fn test_rapid_requests_only_latest_is_built() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        let all = cities();
        sync.request(filter(&all, "s"));
        let last = sync.request(filter(&all, "o"));
        let report = sync.settle(&mut scene, map).unwrap();
        assert_eq!(report.generation, last);
        assert_eq!(sync.settled_generation(), Some(last));
        let expected = filter(&all, "o");
        assert_consistent(&sync, &scene, map, &expected);
        assert_eq!(
            scene.journal().iter().filter(|op| matches!(op, SceneOp::CreateMarker(_))).count(),
            expected.len()
        );
    }

    #[test]
    fn test_empty_subset_clears_everything() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        sync.request(cities());
        sync.settle(&mut scene, map);
        sync.request(Vec::new());
        let report = sync.settle(&mut scene, map).unwrap();
        assert_eq!(report.built, 0);
        assert_consistent(&sync, &scene, map, &[]);
    }

    #[test]
    fn test_click_binding_resolves_city() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        sync.request(cities());
        sync.settle(&mut scene, map);
        let dubbo = sync.pins()[1].marker;
        assert_eq!(sync.city_for(dubbo).map(|c| c.name.as_str()), Some("Dubbo"));
        assert!(sync.is_live(dubbo));
    }

    #[test]
    fn test_duplicate_names_each_get_a_pin() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        let twins = vec![City::new("Orange", -33.28, 149.10), City::new("Orange", 33.5, -80.8)];
        sync.request(twins.clone());
        sync.settle(&mut scene, map);
        assert_consistent(&sync, &scene, map, &twins);
    }

    #[test]
    fn test_teardown_releases_all() {
        let (mut scene, map) = setup();
        let mut sync = MarkerSynchronizer::new(PinStyle::CITY);
        sync.request(cities());
        sync.settle(&mut scene, map);
        assert_eq!(sync.teardown(&mut scene), 4);
        assert_eq!(scene.live_marker_count(), 0);
        assert!(sync.pins().is_empty());
    }
}
