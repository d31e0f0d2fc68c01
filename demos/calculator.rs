//! Calculator example: Batched updates and observed stats
//!
//! This example demonstrates:
//! - Applying modifier updates as one batch
//! - Observing a stat that depends on another stat
//! - Listening to the registered-stats collection
//! - Local modifiers on their own path

use statgraph::value::StatReference;
use statgraph::*;
use std::cell::Cell;
use std::rc::Rc;

fn main() -> Result<(), CalcError> {
    let mut calculator = Calculator::default();

    let strength = Stat::new("Strength");
    let life = Stat::new("Life");
    let damage = Stat::new("PhysicalDamage");
    let main_path = PathDefinition::main_path();

    // Count how often observers hear about changes
    let life_changes = Rc::new(Cell::new(0));
    let sink = life_changes.clone();
    let life_observation = calculator.observe(&life, NodeType::Total, &main_path, move |value| {
        sink.set(sink.get() + 1);
        match value {
            Ok(Some(value)) => println!("  [observer] Life is now {}", value),
            Ok(None) => println!("  [observer] Life has no value"),
            Err(err) => println!("  [observer] Life failed: {}", err),
        }
    });

    calculator
        .explicitly_registered_stats()
        .buffered_view()
        .subscribe(|changes| {
            for change in changes {
                match change {
                    CollectionChange::Added(node) => println!("  [registered] + {:?}", node),
                    CollectionChange::Removed(node) => println!("  [registered] - {:?}", node),
                    CollectionChange::Reset => println!("  [registered] reset"),
                }
            }
        });

    // Character base stats and gear
    println!("Applying character update:");
    let weapon = ModifierSource::Local(LocalSource::Item("Two-Handed Axe".to_string()));
    // Removals match the modifier instance, so keep the ones to take off later
    let ring = Modifier::constant(strength.clone(), Form::BaseAdd, 32.0);
    let gear = vec![
        Modifier::constant(strength.clone(), Form::BaseAdd, 20.0),
        ring.clone(),
        Modifier::constant(life.clone(), Form::BaseAdd, 50.0),
        Modifier::single(life.clone(), Form::BaseAdd, StatReference::new(strength.clone()).times(0.5)),
        Modifier::constant(life.clone(), Form::Increase, 40.0),
        Modifier::constant(damage.clone(), Form::BaseAdd, 35.0).with_source(weapon.clone()),
        Modifier::constant(damage.clone(), Form::Increase, 60.0).with_source(weapon),
        Modifier::constant(damage.clone(), Form::More, 25.0),
    ];
    calculator.update(&CalculatorUpdate::adding(gear))?;

    println!("\n=== Values ===");
    for stat in [&strength, &life, &damage] {
        match calculator.value(stat)? {
            Some(value) => println!("{}: {}", stat, value),
            None => println!("{}: -", stat),
        }
    }

    // Swap a strength ring for a better one in a single update
    println!("\nSwapping a ring:");
    calculator.update(&CalculatorUpdate::new(
        vec![Modifier::constant(strength.clone(), Form::BaseAdd, 40.0)],
        vec![ring],
    ))?;
    println!("Life: {:?}", life_observation.current()?);
    println!("Life observer calls so far: {}", life_changes.get());

    // Paths of the damage stat
    println!("\n=== Damage paths ===");
    for path in calculator.paths(&damage).default_view().items() {
        let subtotal = calculator.node(&damage, NodeType::Subtotal, &path);
        println!("{}: {:?}", path, subtotal.default_view().value()?);
    }

    // Dependencies of Life
    println!("\n=== Dependency snapshot ===");
    let snapshot = calculator.dependency_graph();
    println!("Nodes: {}, edges: {}", snapshot.node_count(), snapshot.edge_count());
    let life_total = calculator.node(&life, NodeType::Total, &main_path);
    for dependency in snapshot.dependencies_of(life_total.default_view().id()) {
        if let Some(label) = snapshot.label(dependency) {
            println!("  Life total reads {}", label);
        }
    }

    // An unknown removal is reported, not ignored
    println!("\nRemoving a modifier that was never added:");
    let unknown = Modifier::constant(life.clone(), Form::More, 1000.0);
    if let Err(err) = calculator.update(&CalculatorUpdate::removing(vec![unknown])) {
        println!("  Error: {}", err);
    }

    Ok(())
}
