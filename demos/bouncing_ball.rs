use event_dynamics::*;

fn main() -> Result<(), SimulationError> {
    let config = SimulatorConfig::default().with_default_contact(ContactParameters::default().with_restitution(0.6));
    let mut sim = Simulator::new(config);

    let ground = sim.add_rigid_body(RigidBody::fixed(Transform::IDENTITY))?;
    sim.add_collider(Collider::plane(LinkRef::root(ground), DVec3::Y, 0.0))?;

    let ball = sim.add_rigid_body(RigidBody::new(
        Transform::from_position(DVec3::new(0.0, 2.0, 0.0)),
        MassProperties::solid_sphere(0.5, 1.0),
    ))?;
    sim.add_collider(Collider::sphere(LinkRef::root(ball), 0.5))?;

    let dt = 1.0 / 100.0;
    for frame in 0..300 {
        sim.step(dt)?;
        let stats = sim.last_step_stats();
        if stats.impacts > 0 {
            let height = sim
                .bodies()
                .link_pose(LinkRef::root(ball))
                .map_or(f64::NAN, |pose| pose.position.y);
            println!(
                "frame {frame:3}: bounce at y = {height:.4}, kinetic energy {:.4} J",
                sim.kinetic_energy()
            );
        }
    }
    println!("Ball settled after {:.2} s", sim.time());
    Ok(())
}
