use event_dynamics::events::grouping::{reduce_minimal_set, remove_nonimpacting_groups};
use event_dynamics::*;

fn ball(bodies: &mut BodySet, x: f64, vy: f64) -> BodyId {
    bodies.insert_rigid(
        RigidBody::new(
            Transform::from_position(DVec3::new(x, 0.5, 0.0)),
            MassProperties::solid_sphere(0.5, 1.0),
        )
        .with_velocity(DVec3::new(0.0, vy, 0.0), DVec3::ZERO),
    )
}

fn ground_contact(bodies: &BodySet, body: BodyId, ground: BodyId, point: DVec3) -> Event {
    let data = ContactData::new(LinkRef::root(body), LinkRef::root(ground), point, DVec3::Y).unwrap();
    let mut event = Event::contact(0.0, data, 1e-6);
    event.classify(bodies);
    event
}

#[test]
fn classification_uses_the_velocity_band() {
    let mut bodies = BodySet::new();
    let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
    let cases = [(-1.0, EventClass::Impacting), (0.0, EventClass::Resting), (1.0, EventClass::Separating)];
    for (vy, expected) in cases {
        let id = ball(&mut bodies, 0.0, vy);
        let event = ground_contact(&bodies, id, ground, DVec3::ZERO);
        assert_eq!(event.class(), expected, "vy = {vy}");
    }
    // Inside the tolerance band is still resting.
    let id = ball(&mut bodies, 0.0, -1e-7);
    assert_eq!(ground_contact(&bodies, id, ground, DVec3::ZERO).class(), EventClass::Resting);
}

#[test]
fn groups_follow_body_connectivity() {
    let mut bodies = BodySet::new();
    let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
    let left = ball(&mut bodies, -2.0, -1.0);
    let middle = ball(&mut bodies, -1.0, 0.0);
    let right = ball(&mut bodies, 3.0, 0.0);

    let touching = ContactData::new(
        LinkRef::root(middle),
        LinkRef::root(left),
        DVec3::new(-1.5, 0.5, 0.0),
        DVec3::X,
    ).unwrap();
    let events = vec![
        ground_contact(&bodies, left, ground, DVec3::new(-2.0, 0.0, 0.0)),
        ground_contact(&bodies, right, ground, DVec3::new(3.0, 0.0, 0.0)),
        Event::contact(0.0, touching, 1e-6),
        ground_contact(&bodies, middle, ground, DVec3::new(-1.0, 0.0, 0.0)),
    ];

    let mut groups = EventGrouper::new().group(events, &bodies);
    assert_eq!(groups.len(), 2);
    // The static ground does not connect groups.
    let sizes: Vec<usize> = groups.iter().map(EventGroup::len).collect();
    assert_eq!(sizes, vec![3, 1]);
    assert_eq!(groups[0].bodies, vec![left, middle]);
    assert_eq!(groups[1].bodies, vec![right]);

    remove_nonimpacting_groups(&mut groups);
    assert_eq!(groups.len(), 1);
    assert!(groups[0].has_impacting());
}

#[test]
fn minimal_set_keeps_the_manifold_outline() {
    let mut bodies = BodySet::new();
    let ground = bodies.insert_rigid(RigidBody::fixed(Transform::IDENTITY));
    let body = ball(&mut bodies, 0.0, -1.0);

    let mut events = Vec::new();
    for i in 0..3 {
        for j in 0..3 {
            let point = DVec3::new(i as f64 - 1.0, 0.0, j as f64 - 1.0);
            events.push(ground_contact(&bodies, body, ground, point));
        }
    }
    // A duplicate of the center point.
    events.push(ground_contact(&bodies, body, ground, DVec3::new(0.0, 0.0, 0.0)));

    reduce_minimal_set(&mut events, &bodies, 1e-6);
    assert!(events.len() < 10);
    assert!(!events.is_empty());
    for corner in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
        let corner = DVec3::new(corner.0, 0.0, corner.1);
        assert!(
            events
                .iter()
                .any(|event| event.as_contact().unwrap().point.distance(corner) < 1e-12),
            "corner {corner} was dropped"
        );
    }
}
