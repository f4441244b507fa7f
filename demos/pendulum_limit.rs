use event_dynamics::*;

fn main() -> Result<(), SimulationError> {
    let mut sim = Simulator::default();

    let mut pendulum = Multibody::new(Transform::IDENTITY);
    pendulum.add_link(
        Link::new("arm", None, JointType::Revolute { axis: DVec3::Z })
            .with_mass(1.0, DVec3::X, DMat3::from_diagonal(DVec3::splat(0.01)))
            .with_limit(JointLimit::new(-0.8, 0.8).with_restitution(0.5)),
    );
    let id = sim.add_multibody(pendulum)?;

    for frame in 0..400 {
        sim.step(0.005)?;
        let hit = sim
            .last_events()
            .iter()
            .any(|event| matches!(event.kind, EventKind::JointLimit(_)) && event.is_impacting());
        if let Some(mechanism) = sim.body(id).and_then(SimBody::as_multibody) {
            if hit || frame % 50 == 0 {
                println!(
                    "t = {:.3}: q = {:+.4}, dq = {:+.4}{}",
                    sim.time(),
                    mechanism.q()[0],
                    mechanism.dq()[0],
                    if hit { " (limit)" } else { "" }
                );
            }
        }
    }
    Ok(())
}
