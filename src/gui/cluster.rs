// Screen-space grid clustering for the pin layer
use egui::Pos2;
use rustc_hash::FxHashMap;

/// Points that fell into the same grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    /// Mean of the member points.
    pub center: Pos2,
    /// Indices into the input slice, in input order.
    pub members: Vec<usize>,
}

/// Buckets `points` into square cells of `cell` screen points.
///
/// Groups come out in the order their first member appears. A non-positive
/// cell size disables clustering.
pub fn group_points(points: &[Pos2], cell: f32) -> Vec<Group> {
    if cell <= 0.0 {
        return points
            .iter()
            .enumerate()
            .map(|(i, p)| Group { center: *p, members: vec![i] })
            .collect();
    }

    let mut slots: FxHashMap<(i32, i32), usize> = FxHashMap::default();
    let mut groups: Vec<Group> = Vec::new();
    let mut sums: Vec<(f32, f32)> = Vec::new();

    for (i, p) in points.iter().enumerate() {
        let key = ((p.x / cell).floor() as i32, (p.y / cell).floor() as i32);
        let slot = *slots.entry(key).or_insert_with(|| {
            groups.push(Group { center: *p, members: Vec::new() });
            sums.push((0.0, 0.0));
            groups.len() - 1
        });
        groups[slot].members.push(i);
        sums[slot].0 += p.x;
        sums[slot].1 += p.y;
    }

    for (group, (sx, sy)) in groups.iter_mut().zip(sums) {
        let n = group.members.len() as f32;
        group.center = Pos2::new(sx / n, sy / n);
    }
    groups
}
