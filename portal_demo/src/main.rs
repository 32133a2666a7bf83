//! Portal demo
//!
//! Builds a two room house of cells joined by a pair of portals, then runs
//! every query kind against it and walks a node from one room into the other.
//!
//! Usage: `portal_demo [scene_config.toml|scene_config.ron]`

use std::ops::ControlFlow;

use scene_engine::foundation::logging;
use scene_engine::foundation::math::{constants, Mat4Ext};
use scene_engine::prelude::*;

const ROOM_SIZE: f32 = 20.0;
const DOOR_WIDTH: f32 = 2.0;
const DOOR_HEIGHT: f32 = 3.0;

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("scene: {0}")]
    Scene(#[from] SceneError),

    #[error("query: {0}")]
    Query(#[from] QueryError),
}

struct House {
    scene: Scene,
    hall: SceneNodeId,
    kitchen: SceneNodeId,
    cat: SceneNodeId,
}

fn furniture(name: &str, position: Vec3, half_size: f32) -> SceneNode {
    SceneNode::new(name, NODE_CLASS)
        .with_local_aabb(AABB::from_center_extents(Vec3::zeros(), Vec3::new(half_size, half_size, half_size)))
        .with_transform(Transform::from_position(position))
}

fn door(name: &str, target: &str, x: f32, angle: f32) -> SceneNode {
    SceneNode::cell_portal(name, target, Polygon::rectangle(DOOR_WIDTH, DOOR_HEIGHT)).with_transform(
        Transform::from_position_rotation(Vec3::new(x, 0.0, 0.0), Quat::from_axis_angle(&Vec3::y_axis(), angle)),
    )
}

fn build_house(config: SceneConfig) -> Result<House, DemoError> {
    let mut scene = Scene::with_config(config);
    let root = scene.root();
    let half = ROOM_SIZE * 0.5;
    let room_box = AABB::new(Vec3::new(-half, -half, -half), Vec3::new(half, half, half));

    let hall = scene.insert(root, SceneNode::cell("Hall").with_bounds(room_box).with_local_aabb(room_box))?;
    let kitchen = scene.insert(
        root,
        SceneNode::cell("Kitchen")
            .with_bounds(room_box)
            .with_local_aabb(room_box)
            .with_transform(Transform::from_position(Vec3::new(ROOM_SIZE, 0.0, 0.0))),
    )?;
    scene.create_hierarchy(kitchen, HierarchyKind::KdTree)?;

    scene.insert(hall, door("ToKitchen", "Parent.Kitchen", half, constants::HALF_PI))?;
    scene.insert(kitchen, door("ToHall", "Parent.Hall", -half, -constants::HALF_PI))?;

    scene.insert(hall, furniture("Lamp", Vec3::new(2.0, 0.0, 3.0), 0.5))?;
    scene.insert(hall, furniture("Sofa", Vec3::new(-4.0, 0.0, 0.0), 1.5))?;
    let cat = scene.insert(hall, furniture("Cat", Vec3::new(8.0, 0.0, 0.0), 0.3))?;

    for i in 0..12 {
        let offset = i as f32 - 6.0;
        scene.insert(kitchen, furniture("Jar", Vec3::new(offset, 1.0, 4.0 + offset * 0.3), 0.2))?;
    }
    scene.insert(kitchen, furniture("Lamp", Vec3::new(-6.0, 0.0, 0.0), 0.5))?;
    scene.insert(
        kitchen,
        furniture("Stove", Vec3::new(5.0, 0.0, -5.0), 1.0).with_max_draw_distance(15.0),
    )?;

    Ok(House { scene, hall, kitchen, cat })
}

fn names(scene: &Scene, ids: &[SceneNodeId]) -> Vec<String> {
    ids.iter()
        .filter_map(|&id| scene.node(id))
        .map(|node| node.name().to_string())
        .collect()
}

fn run_query(scene: &mut Scene, query: &mut dyn SceneQuery, container: SceneNodeId) -> Result<Vec<SceneNodeId>, DemoError> {
    let mut found = Vec::new();
    query.perform_query(scene, container, &mut |id| {
        found.push(id);
        ControlFlow::Continue(())
    })?;
    Ok(found)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading scene configuration from {}", path);
            SceneConfig::load_from_file(&path).map_err(DemoError::from)?
        }
        None => SceneConfig::default(),
    };
    let House { mut scene, hall, kitchen, cat } = build_house(config)?;
    let root = scene.root();
    log::info!("Built house with {} scene nodes", scene.num_nodes());

    let everything = run_query(&mut scene, &mut EnumerateQuery::new(), root)?;
    log::info!("Enumerate: {} nodes", everything.len());

    let lamps = run_query(&mut scene, &mut NameQuery::new("Lamp*"), root)?;
    log::info!("Name query 'Lamp*': {:?}", names(&scene, &lamps));

    let doors = run_query(&mut scene, &mut ClassNameQuery::new(CELL_PORTAL_CLASS), root)?;
    log::info!("Class query '{}': {:?}", CELL_PORTAL_CLASS, names(&scene, &doors));

    let near_door = run_query(&mut scene, &mut VolumeQuery::sphere(Vec3::new(9.0, 0.0, 0.0), 5.0), hall)?;
    log::info!("Sphere query at the kitchen door: {:?}", names(&scene, &near_door));

    let view = <Mat4 as Mat4Ext>::look_at(Vec3::new(-8.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 0.0), Vec3::y());
    let projection = <Mat4 as Mat4Ext>::perspective(60.0 * constants::DEG_TO_RAD, 16.0 / 9.0, 0.1, 100.0);
    let mut cull = CullQuery::from_camera(&view, &projection);
    let visible = run_query(&mut scene, &mut cull, hall)?;
    let statistics = cull.statistics();
    log::info!("Visible from the hall: {:?}", names(&scene, &visible));
    log::info!(
        "Cull statistics: {} hierarchy nodes, {} culled, {} tests skipped, {} portals, {:?}",
        statistics.traversed_nodes,
        statistics.frustum_culled_nodes,
        statistics.skipped_frustum_tests,
        statistics.visited_portals,
        statistics.duration
    );

    for x in [9.0, 10.5] {
        match scene.move_to(cat, Vec3::new(x, 0.0, 0.0))? {
            Some(cell) => log::info!(
                "Cat went through a door into {}",
                scene.node(cell).map_or("?", SceneNode::name)
            ),
            None => log::info!("Cat moved to x = {}", x),
        }
    }

    let query = scene.create_query(kitchen, Box::new(NameQuery::new("Cat")))?;
    let mut cats = 0;
    scene.perform_query(kitchen, query, &mut |_| {
        cats += 1;
        ControlFlow::Continue(())
    })?;
    log::info!("Cats in the kitchen: {}", cats);
    scene.destroy_query(kitchen, query)?;

    if let Some(hierarchy) = scene.hierarchy(kitchen) {
        log::info!(
            "Kitchen hierarchy: {} nodes, {} free, {:?}",
            hierarchy.num_nodes(),
            hierarchy.num_free_nodes(),
            hierarchy.stats()
        );
    }
    Ok(())
}
