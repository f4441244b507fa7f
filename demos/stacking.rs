use event_dynamics::*;

fn main() -> Result<(), SimulationError> {
    let config = SimulatorConfig::default().with_default_contact(ContactParameters::default().with_friction(0.5));
    let mut sim = Simulator::new(config);

    let ground = sim.add_rigid_body(RigidBody::fixed(Transform::IDENTITY))?;
    sim.add_collider(Collider::plane(LinkRef::root(ground), DVec3::Y, 0.0))?;

    let radius = 0.5;
    let mut spheres = Vec::new();
    for level in 0..4 {
        let id = sim.add_rigid_body(RigidBody::new(
            Transform::from_position(DVec3::new(0.0, radius + 2.0 * radius * level as f64, 0.0)),
            MassProperties::solid_sphere(radius, 1.0),
        ))?;
        sim.add_collider(Collider::sphere(LinkRef::root(id), radius))?;
        spheres.push(id);
    }

    for _ in 0..200 {
        sim.step(0.01)?;
    }

    let stats = sim.last_step_stats();
    println!(
        "Simulated a stack of {} spheres for {:.2} s ({} iterations, {} collapses in the last step)",
        spheres.len(),
        sim.time(),
        stats.iterations,
        stats.zeno_collapses
    );
    for event in sim.last_events() {
        if let Some(contact) = event.as_contact() {
            println!(
                "  contact at y = {:.3}: normal impulse {:.5}",
                contact.point.y,
                contact.normal_impulse()
            );
        }
    }
    Ok(())
}
