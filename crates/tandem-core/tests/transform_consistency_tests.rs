// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Any sequence of navigation changes, once committed and replicated through
//! the frame payload codec, leaves the slave with the master's transform.
#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use proptest::prelude::*;
use tandem_config::NavMode;
use tandem_core::{DisplayFrame, NavTransform, NavigationManager, Quat, Side, Vec3};
use tandem_proto::{ClusterRole, FramePayload};

#[derive(Debug, Clone)]
enum Op {
    Set(NavTransform),
    Concat(NavTransform, Side),
}

fn transform() -> impl Strategy<Value = NavTransform> {
    (
        prop::array::uniform3(-50.0f64..50.0),
        prop::array::uniform3(-1.0f64..1.0),
        -3.2f64..3.2,
        0.25f64..4.0,
    )
        .prop_map(|(t, axis, angle, scale)| {
            NavTransform::translate(Vec3::from(t))
                .compose(&NavTransform::rotate(Quat::from_axis_angle(
                    Vec3::from(axis),
                    angle,
                )))
                .compose(&NavTransform::scale(scale))
        })
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        1 => transform().prop_map(Op::Set),
        3 => (transform(), prop::bool::ANY).prop_map(|(t, left)| {
            Op::Concat(t, if left { Side::Left } else { Side::Right })
        }),
    ]
}

fn apply(nav: &mut NavigationManager, op: &Op) {
    match op {
        Op::Set(t) => nav.set_transformation(*t),
        Op::Concat(t, side) => nav.concatenate(t, *side),
    }
}

fn replicate(master: &mut NavigationManager, slave: &mut NavigationManager) {
    master.commit_pending();
    let mut payload = FramePayload::default();
    master.write_groups(master.dirty(), &mut payload);
    let bytes = payload.to_bytes().unwrap();
    slave.apply_remote(&FramePayload::from_bytes(&bytes).unwrap());
    let _ = master.take_dirty();
}

proptest! {
    #[test]
    fn slave_matches_master_after_each_frame(
        frames in prop::collection::vec(prop::collection::vec(op(), 0..6), 1..8),
        deferred in prop::bool::ANY,
    ) {
        let mode = if deferred { NavMode::Deferred } else { NavMode::Immediate };
        let mut master = NavigationManager::new(ClusterRole::Master, mode, DisplayFrame::default());
        let mut slave =
            NavigationManager::new(ClusterRole::Slave, NavMode::Deferred, DisplayFrame::default());
        for ops in &frames {
            for op in ops {
                apply(&mut master, op);
            }
            replicate(&mut master, &mut slave);
            prop_assert!(slave.current().approx_eq(master.current(), 1e-9));
            prop_assert!(slave.current_inverse().approx_eq(master.current_inverse(), 1e-9));
        }
    }

    #[test]
    fn long_concatenation_chains_stay_normalized(
        steps in prop::collection::vec((transform(), prop::bool::ANY), 1..64),
    ) {
        let mut nav =
            NavigationManager::new(ClusterRole::Master, NavMode::Immediate, DisplayFrame::default());
        for (t, left) in &steps {
            let side = if *left { Side::Left } else { Side::Right };
            nav.concatenate(t, side);
        }
        let current = nav.current();
        prop_assert!((current.rotation.norm() - 1.0).abs() < 1e-9);
        prop_assert!(current.scale.is_finite() && current.scale > 0.0);
    }
}
