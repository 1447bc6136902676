use formats::geojson::GeoPoint;

/// Pixel distance above which consecutive vertices are treated as a wrap
/// around the world edge and get a pen lift instead of a stroke.
pub const JUMP_PX: f64 = 256.0;

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PathCommand {
    MoveTo(f64, f64),
    LineTo(f64, f64),
}

/// Traces polygon rings into a 2D path in pixel space.
///
/// `project` maps a vertex to pixels; `origin` is subtracted from every
/// projected point; `step` skips vertices for cheap rendering at low zoom
/// (clamped to at least 1). Each ring is closed back to its first vertex
/// unless that closing edge would itself be a jump.
pub fn trace_rings(
    rings: &[Vec<GeoPoint>],
    project: impl Fn(&GeoPoint) -> (f64, f64),
    step: usize,
    origin: (f64, f64),
) -> Vec<PathCommand> {
    let step = step.max(1);
    let local = |p: &GeoPoint| {
        let (x, y) = project(p);
        (x - origin.0, y - origin.1)
    };
    let is_jump = |a: (f64, f64), b: (f64, f64)| {
        (b.0 - a.0).abs() > JUMP_PX || (b.1 - a.1).abs() > JUMP_PX
    };

    let mut out = Vec::new();
    for ring in rings {
        let mut prev: Option<(f64, f64)> = None;
        for p in ring.iter().step_by(step) {
            let cur = local(p);
            match prev {
                Some(last) if !is_jump(last, cur) => out.push(PathCommand::LineTo(cur.0, cur.1)),
                _ => out.push(PathCommand::MoveTo(cur.0, cur.1)),
            }
            prev = Some(cur);
        }
        if let (Some(last), Some(first)) = (prev, ring.first()) {
            let first = local(first);
            if !is_jump(last, first) {
                out.push(PathCommand::LineTo(first.0, first.1));
            }
        }
    }
    out
}
