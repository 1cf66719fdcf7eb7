//! Constrained allocation solver.
//!
//! Maximizes `sum(a[i] * ln(x[i] + 1))` subject to `sum(x) = total` and
//! `lo[i] <= x[i] <= hi[i]`. The objective is separable and concave
//! wherever it earns anything (`a[i] > 0`), so the optimum satisfies the
//! marginal-balance condition `a[i] / (x[i] + 1) = lambda` with each
//! coordinate clamped to its bounds; the solver bisects on `lambda`
//! until the implied allocation meets the budget. Infeasible budgets pin
//! at the nearest bound, and a result is always returned — there is no
//! failure path.

/// Bisection steps when projecting onto the budget set.
const PROJECTION_ITERATIONS: usize = 100;

/// Project `point` onto `{ x : sum(x) = total, lo <= x <= hi }`.
///
/// Water-filling: bisect for the shift `t` with
/// `sum(clamp(point + t, lo, hi)) = total`. When the box cannot reach
/// `total` at all, the nearest box corner is returned instead: all
/// floors when `total <= sum(lo)`, all caps when `total >= sum(hi)`.
///
/// Caller contract: `lo[i] <= hi[i]` for every `i`.
pub fn project_onto_budget(point: &[f64], lo: &[f64], hi: &[f64], total: f64) -> Vec<f64> {
    if point.is_empty() {
        return Vec::new();
    }
    let floor_sum: f64 = lo.iter().sum();
    let cap_sum: f64 = hi.iter().sum();
    if total <= floor_sum {
        return lo.to_vec();
    }
    if total >= cap_sum {
        return hi.to_vec();
    }

    let mut t_low = lo
        .iter()
        .zip(point)
        .map(|(l, p)| l - p)
        .fold(f64::INFINITY, f64::min);
    let mut t_high = hi
        .iter()
        .zip(point)
        .map(|(h, p)| h - p)
        .fold(f64::NEG_INFINITY, f64::max);
    let shifted_sum = |t: f64| -> f64 {
        point
            .iter()
            .zip(lo.iter().zip(hi))
            .map(|(p, (l, h))| (p + t).clamp(*l, *h))
            .sum()
    };
    for _ in 0..PROJECTION_ITERATIONS {
        let t = 0.5 * (t_low + t_high);
        if shifted_sum(t) < total {
            t_low = t;
        } else {
            t_high = t;
        }
    }

    let t = 0.5 * (t_low + t_high);
    point
        .iter()
        .zip(lo.iter().zip(hi))
        .map(|(p, (l, h))| (p + t).clamp(*l, *h))
        .collect()
}

/// Allocation maximizing `sum(a[i] * ln(x[i] + 1))` over the budget set.
///
/// Caller contract: `lo[i] <= hi[i]` and `lo[i] >= 0` for every `i`
/// (the log term must stay defined), and all slices the same length.
/// `max_iterations` caps the multiplier bisection. `seed` only matters
/// when no coefficient is positive: every feasible point is then equally
/// bad or worse, so the projected seed is returned as the best effort.
pub fn maximize_log_revenue(
    a: &[f64],
    lo: &[f64],
    hi: &[f64],
    total: f64,
    seed: &[f64],
    max_iterations: usize,
) -> Vec<f64> {
    debug_assert_eq!(a.len(), lo.len());
    debug_assert_eq!(a.len(), hi.len());
    debug_assert_eq!(a.len(), seed.len());
    if a.is_empty() {
        return Vec::new();
    }

    let floor_sum: f64 = lo.iter().sum();
    let cap_sum: f64 = hi.iter().sum();
    if total <= floor_sum {
        return lo.to_vec();
    }
    if total >= cap_sum {
        return hi.to_vec();
    }
    if !a.iter().any(|ai| *ai > 0.0) {
        return project_onto_budget(seed, lo, hi, total);
    }

    // Flat and losing channels never earn another dollar; they sit at
    // their floor unless the budget cannot be placed anywhere else.
    let allocation_at = |lambda: f64| -> Vec<f64> {
        a.iter()
            .zip(lo.iter().zip(hi))
            .map(|(ai, (l, h))| {
                if *ai > 0.0 {
                    (ai / lambda - 1.0).clamp(*l, *h)
                } else {
                    *l
                }
            })
            .collect()
    };

    // Budget beyond what the earning channels can absorb overflows into
    // the flat/losing channels, spread up from their floors.
    let saturated: f64 = a
        .iter()
        .zip(lo.iter().zip(hi))
        .map(|(ai, (l, h))| if *ai > 0.0 { *h } else { *l })
        .sum();
    if total >= saturated {
        let pinned: Vec<f64> = a
            .iter()
            .zip(lo.iter().zip(hi))
            .map(|(ai, (l, h))| if *ai > 0.0 { *h } else { *l })
            .collect();
        return project_onto_budget(&pinned, lo, hi, total);
    }

    // The implied allocation shrinks as lambda grows: bracket it between
    // "every earning channel pinned at its cap" and "at its floor".
    let mut lambda_low = f64::INFINITY;
    let mut lambda_high: f64 = 0.0;
    for (ai, (l, h)) in a.iter().zip(lo.iter().zip(hi)) {
        if *ai > 0.0 {
            lambda_low = lambda_low.min(ai / (h + 1.0));
            lambda_high = lambda_high.max(ai / (l + 1.0));
        }
    }
    for _ in 0..max_iterations {
        let mid = 0.5 * (lambda_low + lambda_high);
        if allocation_at(mid).iter().sum::<f64>() > total {
            lambda_low = mid;
        } else {
            lambda_high = mid;
        }
    }

    // The bisection stops a hair off the exact multiplier; one final
    // projection settles the leftover onto the unclamped channels.
    let x = allocation_at(0.5 * (lambda_low + lambda_high));
    project_onto_budget(&x, lo, hi, total)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
