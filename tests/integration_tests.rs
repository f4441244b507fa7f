use approx::assert_abs_diff_eq;
use event_dynamics::*;

const DT: f64 = 0.01;

fn ground(sim: &mut Simulator) -> BodyId {
    let ground = sim
        .add_rigid_body(RigidBody::fixed(Transform::IDENTITY))
        .expect("static body");
    sim.add_collider(Collider::plane(LinkRef::root(ground), DVec3::Y, 0.0))
        .expect("ground collider");
    ground
}

fn sphere(sim: &mut Simulator, position: DVec3, radius: f64) -> BodyId {
    let id = sim
        .add_rigid_body(RigidBody::new(
            Transform::from_position(position),
            MassProperties::solid_sphere(radius, 1.0),
        ))
        .expect("sphere");
    sim.add_collider(Collider::sphere(LinkRef::root(id), radius))
        .expect("sphere collider");
    id
}

fn position(sim: &Simulator, id: BodyId) -> DVec3 {
    sim.bodies().link_pose(LinkRef::root(id)).expect("pose").position
}

fn rigid(sim: &Simulator, id: BodyId) -> &RigidBody {
    sim.body(id).and_then(SimBody::as_rigid).expect("rigid body")
}

#[test]
fn bodies_fall_under_gravity() {
    let mut sim = Simulator::default();
    let id = sim
        .add_rigid_body(RigidBody::new(
            Transform::from_position(DVec3::new(0.0, 10.0, 0.0)),
            MassProperties::solid_sphere(0.5, 1.0),
        ))
        .unwrap();
    let advanced = sim.step(DT).unwrap();
    assert_eq!(advanced, DT);
    assert_abs_diff_eq!(sim.time(), DT);
    // Semi-implicit Euler: the position moves with the updated velocity.
    assert_abs_diff_eq!(position(&sim, id).y, 10.0 - 9.81 * DT * DT, epsilon = 1e-12);
}

#[test]
fn inelastic_ball_comes_to_rest_at_contact_height() {
    let mut sim = Simulator::default();
    ground(&mut sim);
    let ball = sphere(&mut sim, DVec3::new(0.0, 2.0, 0.0), 0.5);

    let mut resolving_step_seen = false;
    for _ in 0..100 {
        let before = sim.kinetic_energy();
        sim.step(DT).unwrap();
        let after = sim.kinetic_energy();
        assert!(position(&sim, ball).y >= 0.5 - 1e-9, "ball penetrated the ground");
        if sim.last_step_stats().impacts > 0 {
            resolving_step_seen = true;
            assert!(after <= before + 1e-12, "energy grew across the impact: {before} -> {after}");
        }
    }

    assert!(resolving_step_seen);
    assert!(!sim.fidelity_degraded());
    assert_abs_diff_eq!(position(&sim, ball).y, 0.5, epsilon = 1e-9);
    assert!(sim.kinetic_energy() < 1e-12);
}

#[test]
fn stacked_spheres_resolve_in_one_group() {
    let mut sim = Simulator::default();
    ground(&mut sim);
    let lower = sphere(&mut sim, DVec3::new(0.0, 0.5, 0.0), 0.5);
    let upper = sphere(&mut sim, DVec3::new(0.0, 1.5, 0.0), 0.5);

    sim.step(DT).unwrap();
    let stats = sim.last_step_stats();
    assert_eq!(stats.zeno_collapses, 1);
    let events = sim.last_events();
    assert_eq!(events.len(), 2);
    let mut impulses: Vec<f64> = events
        .iter()
        .map(|event| event.as_contact().expect("contact").normal_impulse())
        .collect();
    impulses.sort_by(f64::total_cmp);
    assert!(impulses.iter().all(|&impulse| impulse >= 0.0));
    // Each layer carries the weight above it over the remaining step.
    assert_abs_diff_eq!(impulses[0], 9.81 * DT, epsilon = 1e-9);
    assert_abs_diff_eq!(impulses[1], 2.0 * 9.81 * DT, epsilon = 1e-9);

    for _ in 0..50 {
        sim.step(DT).unwrap();
    }
    assert_abs_diff_eq!(position(&sim, lower).y, 0.5, epsilon = 1e-9);
    assert_abs_diff_eq!(position(&sim, upper).y, 1.5, epsilon = 1e-9);
}

#[test]
fn rolling_sphere_stays_on_the_ground() {
    for mu in [0.0, 0.5] {
        let config = SimulatorConfig::default().with_default_contact(ContactParameters::default().with_friction(mu));
        let mut sim = Simulator::new(config);
        ground(&mut sim);
        let ball = sim
            .add_rigid_body(
                RigidBody::new(
                    Transform::from_position(DVec3::new(0.0, 0.5, 0.0)),
                    MassProperties::solid_sphere(0.5, 1.0),
                )
                .with_velocity(DVec3::X, DVec3::new(0.0, 0.0, -2.0)),
            )
            .unwrap();
        sim.add_collider(Collider::sphere(LinkRef::root(ball), 0.5)).unwrap();

        for step in 0..40 {
            sim.step(DT).unwrap();
            let y = position(&sim, ball).y;
            assert!(y >= 0.5 - 1e-9, "mu = {mu}: sank to {y} at step {step}");
            assert_eq!(sim.last_step_stats().impacts, 0, "mu = {mu}: impact at step {step}");
        }
        let body = rigid(&sim, ball);
        assert!(body.velocity.linear.y.abs() < 1e-9);
        assert!(position(&sim, ball).x > 0.39);
    }
}

#[test]
fn spinning_bounces_never_sink() {
    let params = ContactParameters::default().with_friction(0.5);
    for restitution in [0.5, 0.8] {
        let config = SimulatorConfig::default().with_default_contact(params.with_restitution(restitution));
        let mut sim = Simulator::new(config);
        ground(&mut sim);
        let ball = sim
            .add_rigid_body(
                RigidBody::new(
                    Transform::from_position(DVec3::new(0.0, 1.5, 0.0)),
                    MassProperties::solid_sphere(0.5, 1.0),
                )
                .with_velocity(DVec3::new(0.3, 0.0, 0.0), DVec3::ZERO),
            )
            .unwrap();
        sim.add_collider(Collider::sphere(LinkRef::root(ball), 0.5)).unwrap();

        let mut lowest = f64::INFINITY;
        for _ in 0..400 {
            sim.step(DT).unwrap();
            lowest = lowest.min(position(&sim, ball).y);
        }
        assert!(lowest >= 0.5 - 1e-9, "e = {restitution}: lowest point {lowest}");
    }
}

#[test]
fn iteration_cap_accepts_the_rest_of_the_step() {
    let mut config = SimulatorConfig::default();
    config.max_event_iterations = 1;
    let mut sim = Simulator::new(config);
    ground(&mut sim);
    sphere(&mut sim, DVec3::new(0.0, 0.52, 0.0), 0.5);

    // The ball lands inside the step; the cap stops the driver right after.
    assert_eq!(sim.step(0.1).unwrap(), 0.1);
    let stats = sim.last_step_stats();
    assert_eq!(stats.iterations, 1);
    assert_eq!(stats.impacts, 1);
    assert_abs_diff_eq!(sim.time(), 0.1, epsilon = 1e-12);
}

#[test]
fn ignored_pairs_pass_through_each_other() {
    let mut sim = Simulator::default();
    let floor = sim.add_rigid_body(RigidBody::fixed(Transform::IDENTITY)).unwrap();
    let plane = sim
        .add_collider(Collider::plane(LinkRef::root(floor), DVec3::Y, 0.0))
        .unwrap();
    let ball = sim
        .add_rigid_body(RigidBody::new(
            Transform::from_position(DVec3::new(0.0, 0.6, 0.0)),
            MassProperties::solid_sphere(0.5, 1.0),
        ))
        .unwrap();
    let shell = sim.add_collider(Collider::sphere(LinkRef::root(ball), 0.5)).unwrap();
    sim.ignore_collision_pair(shell, plane);

    for _ in 0..50 {
        sim.step(DT).unwrap();
        assert_eq!(sim.last_step_stats().impacts, 0);
        assert!(sim.last_events().is_empty());
    }
    assert!(position(&sim, ball).y < 0.0);
    assert!(!sim.fidelity_degraded());
}

#[test]
fn spinning_box_goes_from_sliding_to_sticking() {
    let mu = 1.0;
    let config = SimulatorConfig::default()
        .with_default_contact(ContactParameters::default().with_friction(mu).with_edges(FrictionEdges::Finite(8)));
    let mut sim = Simulator::new(config);
    ground(&mut sim);
    let half = DVec3::splat(0.5);
    let cube = sim
        .add_rigid_body(
            RigidBody::new(
                Transform::from_position(DVec3::new(0.0, 0.5, 0.0)),
                MassProperties::solid_box(half, 1.0),
            )
            .with_velocity(DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 2.0, 0.0)),
        )
        .unwrap();
    sim.add_collider(Collider::cuboid(LinkRef::root(cube), half)).unwrap();

    let mut slid = false;
    let mut stuck = false;
    for _ in 0..100 {
        sim.step(DT).unwrap();
        for event in sim.last_events() {
            let contact = event.as_contact().expect("contact");
            let normal = contact.normal_impulse();
            let (t1, t2) = contact.tangent_impulse();
            let tangential = t1.hypot(t2);
            assert!(normal >= -1e-12);
            assert!(tangential <= mu * normal + 1e-9, "friction outside the cone");
            if normal > 1e-9 && tangential >= mu * normal * (1.0 - 1e-6) {
                slid = true;
            } else if slid && normal > 1e-9 {
                stuck = true;
            }
        }
    }

    assert!(slid, "the box never slid");
    assert!(stuck, "the box never stuck");
    let body = rigid(&sim, cube);
    assert!(body.velocity.linear.length() < 1e-6);
    assert!(body.velocity.angular.length() < 1e-6);
    assert_abs_diff_eq!(body.transform.position.y, 0.5, epsilon = 1e-6);
}

#[test]
fn bouncing_ball_settles_without_runaway_iterations() {
    let config = SimulatorConfig::default().with_default_contact(ContactParameters::default().with_restitution(0.5));
    let mut sim = Simulator::new(config);
    ground(&mut sim);
    let ball = sphere(&mut sim, DVec3::new(0.0, 1.5, 0.0), 0.5);

    let mut bounces = 0;
    let mut collapses = 0;
    for _ in 0..300 {
        sim.step(DT).unwrap();
        let stats = sim.last_step_stats();
        assert!(stats.iterations <= 48, "{} driver iterations in one step", stats.iterations);
        bounces += stats.impacts;
        collapses += stats.zeno_collapses;
        assert!(position(&sim, ball).y >= 0.5 - 1e-9);
    }

    assert!(bounces > 3, "expected several bounces, saw {bounces}");
    assert!(collapses > 0);
    let body = rigid(&sim, ball);
    assert!(body.velocity.linear.length() < 1e-6);
    assert_abs_diff_eq!(body.transform.position.y, 0.5, epsilon = 1e-5);

    // At rest it stays at rest.
    for _ in 0..10 {
        sim.step(DT).unwrap();
        assert_eq!(sim.last_step_stats().impacts, 0);
    }
    assert!(rigid(&sim, ball).velocity.linear.length() < 1e-6);
}

#[test]
fn events_are_resolved_in_time_order() {
    use std::sync::{Arc, Mutex};

    let mut sim = Simulator::default();
    ground(&mut sim);
    sphere(&mut sim, DVec3::new(-2.0, 0.6, 0.0), 0.5);
    sphere(&mut sim, DVec3::new(2.0, 0.9, 0.0), 0.5);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    sim.hooks_mut().post_impulse = Some(Box::new(move |state: &DriverState<'_>| {
        let mut log = log.lock().expect("hook log");
        log.extend(state.events.iter().map(|event| event.t_true));
    }));

    for _ in 0..60 {
        sim.step(DT).unwrap();
    }
    let times = seen.lock().unwrap().clone();
    assert!(times.len() >= 2);
    assert!(times.windows(2).all(|pair| pair[0] <= pair[1] + 1e-12));
}
