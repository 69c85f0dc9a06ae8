use crate::detection::Star;

/// Rotation, scale and translation invariant code of a 4-star asterism.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AsterismHash {
    /// `[Xc, Yc, Xd, Yd]` in the frame where A = (0, 0) and B = (1, 1).
    pub hash: [f32; 4],
    /// Input indices of stars A, B, C, D.
    pub roles: [usize; 4],
}

/// Hash four stars.
///
/// A and B are the most distant pair, C and D the remaining two in input
/// order. Returns `None` when C or D lies outside the circle whose diameter
/// is AB; callers skip such combinations.
pub fn calculate_asterism_hash(stars: &[Star; 4]) -> Option<AsterismHash> {
    let (mut a, mut b) = (0, 1);
    let mut max_dist = -1.0f32;
    for i in 0..4 {
        for j in 0..i {
            let d = stars[i].distance_squared(&stars[j]);
            if d > max_dist {
                max_dist = d;
                a = i;
                b = j;
            }
        }
    }

    let mut rest = (0..4).filter(|&i| i != a && i != b);
    let (mut c, mut d) = (rest.next()?, rest.next()?);

    let center_x = 0.5 * (stars[a].x + stars[b].x);
    let center_y = 0.5 * (stars[a].y + stars[b].y);
    let radius_sq = 0.25 * max_dist;
    let outside = |i: usize| {
        let dx = stars[i].x - center_x;
        let dy = stars[i].y - center_y;
        dx * dx + dy * dy > radius_sq
    };
    if outside(c) || outside(d) || max_dist <= 0.0 {
        return None;
    }

    let ab_x = stars[b].x - stars[a].x;
    let ab_y = stars[b].y - stars[a].y;
    let axis_x = (0.5 * (ab_x + ab_y), 0.5 * (ab_y - ab_x));
    let axis_y = (0.5 * (ab_x - ab_y), 0.5 * (ab_y + ab_x));
    let inv_len_sq = 1.0 / (axis_x.0 * axis_x.0 + axis_x.1 * axis_x.1);

    let project = |i: usize| {
        let vx = stars[i].x - stars[a].x;
        let vy = stars[i].y - stars[a].y;
        (
            inv_len_sq * (vx * axis_x.0 + vy * axis_x.1),
            inv_len_sq * (vx * axis_y.0 + vy * axis_y.1),
        )
    };
    let (mut xc, mut yc) = project(c);
    let (mut xd, mut yd) = project(d);

    if xc + xd > 1.0 {
        xc = 1.0 - xc;
        yc = 1.0 - yc;
        xd = 1.0 - xd;
        yd = 1.0 - yd;
        std::mem::swap(&mut a, &mut b);
    }
    if xc > xd {
        std::mem::swap(&mut xc, &mut xd);
        std::mem::swap(&mut yc, &mut yd);
        std::mem::swap(&mut c, &mut d);
    }

    Some(AsterismHash {
        hash: [xc, yc, xd, yd],
        roles: [a, b, c, d],
    })
}
