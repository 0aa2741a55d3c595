#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
use dualview_core::{bounding_box, point_in_polygon, rescale_bounding_box, CoordinateMapping};
use dualview_core::{ImageGeometry, Offset};

/// Deterministic pseudo-random polygons (LCG), star-shaped around a centre.
fn polygons() -> Vec<Vec<Offset>> {
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
        seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (seed >> 33) as f64 / f64::from(u32::MAX >> 1)
    };
    (0..40)
        .map(|_| {
            let cx = next() * 200.0 - 50.0;
            let cy = next() * 200.0 - 50.0;
            let n = 3 + (next() * 9.0) as usize;
            (0..n)
                .map(|i| {
                    let theta = std::f64::consts::TAU * i as f64 / n as f64;
                    let r = 1.0 + next() * 30.0;
                    Offset::new(cx + r * theta.cos(), cy + r * theta.sin())
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_bounding_box_contains_every_vertex() {
    for polygon in polygons() {
        let bbox = bounding_box(&polygon);
        for p in &polygon {
            assert!(bbox.contains(*p), "{p:?} escapes {bbox:?}");
        }
    }
}

#[test]
fn test_point_in_polygon_invariant_under_rotation() {
    for polygon in polygons() {
        let bbox = bounding_box(&polygon);
        let probes: Vec<Offset> = (bbox.left..=bbox.right)
            .step_by(3)
            .flat_map(|x| {
                (bbox.top..=bbox.bottom)
                    .step_by(3)
                    .map(move |y| Offset::new(f64::from(x) + 0.5, f64::from(y) + 0.5))
            })
            .collect();
        let baseline: Vec<bool> = probes
            .iter()
            .map(|p| point_in_polygon(&polygon, *p, Some(&bbox)))
            .collect();

        for shift in 1..polygon.len() {
            let mut rotated = polygon.clone();
            rotated.rotate_left(shift);
            let got: Vec<bool> = probes
                .iter()
                .map(|p| point_in_polygon(&rotated, *p, None))
                .collect();
            assert_eq!(got, baseline, "rotation by {shift} changed the result");
        }
    }
}

#[test]
fn test_rescaled_box_contains_mapped_polygon() {
    let mapping = CoordinateMapping::new(
        &ImageGeometry {
            columns: 256,
            rows: 256,
            column_pixel_spacing: 0.6,
            row_pixel_spacing: 0.6,
        },
        Offset::new(2.5, -1.0),
        &ImageGeometry {
            columns: 192,
            rows: 192,
            column_pixel_spacing: 0.8,
            row_pixel_spacing: 0.8,
        },
        Offset::new(-4.0, 0.25),
    )
    .unwrap();

    for polygon in polygons() {
        let mapped_box = rescale_bounding_box(&bounding_box(&polygon), |p| mapping.apply(p));
        for p in mapping.apply_all(&polygon) {
            assert!(mapped_box.contains(p), "{p:?} escapes {mapped_box:?}");
        }
    }
}
