use event_dynamics::dynamics::{decode_impulses, FrictionState, ImpulseApplicator, RowKind};
use event_dynamics::utils::linalg::VectorN;
use event_dynamics::*;

const TOL: f64 = 1e-8;

struct Scene {
    bodies: BodySet,
    cube: BodyId,
    events: Vec<Event>,
}

/// A unit cube touching the ground with its four bottom vertices.
fn cube_on_ground(linear: DVec3, angular: DVec3, params: ContactParameters) -> Scene {
    let mut bodies = BodySet::new();
    let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
    let cube = bodies.insert_rigid(
        RigidBody::new(
            Transform::from_position(DVec3::new(0.0, 0.5, 0.0)),
            MassProperties::solid_box(DVec3::splat(0.5), 2.0),
        )
        .with_velocity(linear, angular),
    );
    bodies.calc_fwd_dyn(SimulatorConfig::default().gravity);

    let events = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)]
        .into_iter()
        .map(|(x, z)| {
            let contact = ContactData::new(
                LinkRef::root(cube),
                LinkRef::root(ground),
                DVec3::new(x, 0.0, z),
                DVec3::Y,
            ).unwrap()
            .with_parameters(params);
            let mut event = Event::contact(0.0, contact, 1e-6);
            event.classify(&bodies);
            event
        })
        .collect();
    Scene { bodies, cube, events }
}

fn solve(scene: &Scene, mode: SolveMode) -> (ContactProblem, VectorN) {
    let problem_builder = ProblemBuilder::new(false, 1e-6);
    let mut problem = problem_builder
        .build(&scene.events, &scene.bodies, &Arena::new(), mode)
        .expect("problem");
    let mut solver = ContactSolver::new(LcpSettings::default(), 1e-6);
    let solution = solver.solve(&mut problem).expect("solution");
    (problem, solution.magnitudes)
}

fn applicator() -> ImpulseApplicator {
    ImpulseApplicator::new(EnergyCheck::default(), SimulatorConfig::default().gravity)
}

#[test]
fn impulses_prevent_penetration_and_are_complementary() {
    let params = ContactParameters::default().with_friction(0.4);
    let scene = cube_on_ground(DVec3::new(1.0, -2.0, 0.5), DVec3::new(0.3, 0.0, -0.2), params);
    assert!(scene.events.iter().all(Event::is_impacting));

    let (problem, magnitudes) = solve(&scene, SolveMode::Impulse { restitution: false });
    let post = problem.post_velocity(&magnitudes);
    for block in &problem.contacts {
        let impulse = magnitudes[block.normal];
        let velocity = post[block.normal];
        assert!(impulse >= -TOL, "negative normal impulse {impulse}");
        assert!(velocity >= -TOL, "contact still approaching at {velocity}");
        assert!(
            (impulse * velocity).abs() < 1e-6,
            "impulse {impulse} and velocity {velocity} are both active"
        );
    }
}

#[test]
fn friction_stays_inside_the_cone() {
    let mu = 0.6;
    for (edges, linear) in [
        (FrictionEdges::Finite(4), DVec3::new(0.0, -1.0, 0.0)),
        (FrictionEdges::Finite(8), DVec3::new(3.0, -1.0, -1.0)),
        (FrictionEdges::Finite(16), DVec3::new(0.01, -4.0, 0.0)),
    ] {
        let params = ContactParameters::default().with_friction(mu).with_edges(edges);
        let mut scene = cube_on_ground(linear, DVec3::new(0.0, 1.0, 0.0), params);
        let (problem, magnitudes) = solve(&scene, SolveMode::Impulse { restitution: false });
        decode_impulses(&problem, &magnitudes, &mut scene.events);
        for event in &scene.events {
            let contact = event.as_contact().unwrap();
            let normal = contact.normal_impulse();
            let (t1, t2) = contact.tangent_impulse();
            assert!(normal >= -TOL);
            assert!(
                t1.hypot(t2) <= mu * normal + 1e-9,
                "tangential impulse {} exceeds {}",
                t1.hypot(t2),
                mu * normal
            );
        }
    }
}

#[test]
fn sliding_friction_opposes_slip() {
    let mu = 0.3;
    let params = ContactParameters::default().with_friction(mu);
    let mut scene = cube_on_ground(DVec3::new(5.0, -0.5, 0.0), DVec3::ZERO, params);
    let (problem, magnitudes) = solve(&scene, SolveMode::Impulse { restitution: false });
    assert!(problem
        .contacts
        .iter()
        .all(|block| block.state == FrictionState::Sliding));
    assert!(problem.rows.iter().any(|row| row.kind == RowKind::Slip));

    decode_impulses(&problem, &magnitudes, &mut scene.events);
    for event in &scene.events {
        let contact = event.as_contact().unwrap();
        assert!(contact.impulse.lin.x <= 0.0);
        let (t1, t2) = contact.tangent_impulse();
        assert!((t1.hypot(t2) - mu * contact.normal_impulse()).abs() < 1e-9);
    }
}

#[test]
fn viscous_friction_never_leaves_the_cone() {
    let mu = 0.3;
    let params = ContactParameters::default()
        .with_friction(mu)
        .with_viscous_friction(0.1);
    let mut scene = cube_on_ground(DVec3::new(5.0, -0.5, 0.0), DVec3::ZERO, params);
    let (problem, magnitudes) = solve(&scene, SolveMode::Impulse { restitution: false });
    assert!(problem
        .contacts
        .iter()
        .all(|block| block.state == FrictionState::Sliding && block.mu == mu));

    decode_impulses(&problem, &magnitudes, &mut scene.events);
    for event in &scene.events {
        let contact = event.as_contact().unwrap();
        let normal = contact.normal_impulse();
        let (t1, t2) = contact.tangent_impulse();
        assert!(normal > TOL);
        assert!(t1.hypot(t2) <= mu * normal + 1e-9);
        assert!((t1.hypot(t2) - mu * normal).abs() < 1e-9);
    }
}

#[test]
fn inelastic_impulses_never_add_energy() {
    let params = ContactParameters::default().with_friction(0.5);
    let mut scene = cube_on_ground(DVec3::new(0.5, -3.0, 0.0), DVec3::new(1.0, 0.0, 1.0), params);
    let (problem, magnitudes) = solve(&scene, SolveMode::Impulse { restitution: false });
    let before = scene.bodies.total_kinetic_energy();
    let change = applicator()
        .apply(&problem, &magnitudes, &mut scene.bodies, 0.01, true)
        .unwrap();
    assert!(!change.rolled_back);
    assert!(change.after <= change.before * (1.0 + 1e-9));
    assert!(scene.bodies.total_kinetic_energy() <= before * (1.0 + 1e-9));
}

#[test]
fn restitution_reverses_the_normal_velocity() {
    let params = ContactParameters::frictionless().with_restitution(0.5);
    let mut scene = cube_on_ground(DVec3::new(0.0, -2.0, 0.0), DVec3::ZERO, params);
    let (problem, magnitudes) = solve(&scene, SolveMode::Impulse { restitution: true });
    let change = applicator()
        .apply(&problem, &magnitudes, &mut scene.bodies, 0.01, true)
        .unwrap();
    assert!(!change.rolled_back);
    assert!(change.after < change.before);

    let cube = scene.bodies.get(scene.cube).and_then(SimBody::as_rigid).unwrap();
    assert!((cube.velocity.linear.y - 1.0).abs() < 1e-6);
    assert!(cube.velocity.angular.length() < 1e-6);
}

#[test]
fn resting_forces_balance_gravity() {
    let scene = cube_on_ground(DVec3::ZERO, DVec3::ZERO, ContactParameters::frictionless());
    let horizon = 0.01;
    let (problem, magnitudes) = solve(&scene, SolveMode::Force { horizon });
    let total: f64 = problem.contacts.iter().map(|block| magnitudes[block.normal]).sum();
    assert!((total - 2.0 * 9.81).abs() < 1e-6);

    let post = problem.post_velocity(&magnitudes);
    for block in &problem.contacts {
        assert!(post[block.normal].abs() < 1e-6);
    }
}

#[test]
fn solving_is_deterministic() {
    let params = ContactParameters::default().with_friction(0.7).with_restitution(0.2);
    let scene = cube_on_ground(DVec3::new(0.4, -1.5, -0.3), DVec3::new(0.2, 0.5, 0.1), params);
    let (first_problem, first) = solve(&scene, SolveMode::Impulse { restitution: true });
    for _ in 0..5 {
        let (problem, again) = solve(&scene, SolveMode::Impulse { restitution: true });
        assert_eq!(problem.coupling, first_problem.coupling);
        assert_eq!(again, first);
    }
}
