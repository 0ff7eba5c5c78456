//! Property tests over the plugin graph: any edit sequence leaves the
//! chain order, the persisted config, and the container set mutually
//! consistent - and never disturbs an instance id.

use std::sync::Arc;

use proptest::prelude::*;

use hotmic_config::{ChannelConfig, EngineConfig};
use hotmic_engine::{EngineRig, PluginFactory, build_engine};
use hotmic_registry::PluginRegistry;

const BLOCK: usize = 256;

#[derive(Debug, Clone)]
enum Edit {
    Insert { index: usize },
    Remove { pick: usize },
    Move { pick: usize, to: usize },
    Bypass { pick: usize, flag: bool },
    CreateContainer,
    AssignToContainer { pick: usize, container_pick: usize },
    ContainerBypass { container_pick: usize, flag: bool },
    MoveContainer { container_pick: usize, to: usize },
    RemoveContainer { container_pick: usize },
}

fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0usize..12).prop_map(|index| Edit::Insert { index }),
        (0usize..12).prop_map(|pick| Edit::Remove { pick }),
        ((0usize..12), (0usize..12)).prop_map(|(pick, to)| Edit::Move { pick, to }),
        ((0usize..12), any::<bool>()).prop_map(|(pick, flag)| Edit::Bypass { pick, flag }),
        Just(Edit::CreateContainer),
        ((0usize..12), (0usize..4))
            .prop_map(|(pick, container_pick)| Edit::AssignToContainer { pick, container_pick }),
        ((0usize..4), any::<bool>())
            .prop_map(|(container_pick, flag)| Edit::ContainerBypass { container_pick, flag }),
        ((0usize..4), (0usize..12))
            .prop_map(|(container_pick, to)| Edit::MoveContainer { container_pick, to }),
        (0usize..4).prop_map(|container_pick| Edit::RemoveContainer { container_pick }),
    ]
}

fn registry_factory() -> Arc<PluginFactory> {
    let registry = PluginRegistry::new();
    Arc::new(move |type_id, sample_rate, block_size| {
        registry.create(type_id, sample_rate, block_size)
    })
}

fn fresh_rig() -> EngineRig {
    let config = EngineConfig {
        sample_rate: 48000,
        block_size: BLOCK,
        channels: vec![ChannelConfig::new("Mic 1")],
        ..EngineConfig::default()
    };
    build_engine(&config, registry_factory()).expect("engine builds")
}

fn apply_edit(rig: &mut EngineRig, edit: &Edit) {
    let graph_len = rig.handle.graph(0).unwrap().entries().len();
    let ids: Vec<u64> = rig.handle.graph(0).unwrap().order();
    let container_ids: Vec<u64> = rig
        .handle
        .graph(0)
        .unwrap()
        .containers()
        .iter()
        .map(|c| c.id)
        .collect();

    match edit {
        Edit::Insert { index } => {
            let _ = rig.handle.insert_plugin(0, "gain", *index);
        }
        Edit::Remove { pick } => {
            if !ids.is_empty() {
                let _ = rig.handle.remove_plugin(0, ids[pick % ids.len()]);
            }
        }
        Edit::Move { pick, to } => {
            if !ids.is_empty() {
                let id = ids[pick % ids.len()];
                let to = to % (graph_len.max(1));
                let _ = rig.handle.graph_mut(0).unwrap().move_plugin(id, to);
            }
        }
        Edit::Bypass { pick, flag } => {
            if !ids.is_empty() {
                let id = ids[pick % ids.len()];
                let _ = rig.handle.graph_mut(0).unwrap().set_plugin_bypass(id, *flag);
            }
        }
        Edit::CreateContainer => {
            let _ = rig.handle.graph_mut(0).unwrap().create_container("Group");
        }
        Edit::AssignToContainer {
            pick,
            container_pick,
        } => {
            if !ids.is_empty() && !container_ids.is_empty() {
                let id = ids[pick % ids.len()];
                let container = container_ids[container_pick % container_ids.len()];
                let _ = rig
                    .handle
                    .graph_mut(0)
                    .unwrap()
                    .assign_to_container(id, container);
            }
        }
        Edit::ContainerBypass {
            container_pick,
            flag,
        } => {
            if !container_ids.is_empty() {
                let container = container_ids[container_pick % container_ids.len()];
                let _ = rig
                    .handle
                    .graph_mut(0)
                    .unwrap()
                    .set_container_bypass(container, *flag);
            }
        }
        Edit::MoveContainer { container_pick, to } => {
            if !container_ids.is_empty() {
                let container = container_ids[container_pick % container_ids.len()];
                let _ = rig
                    .handle
                    .graph_mut(0)
                    .unwrap()
                    .move_container(container, *to);
            }
        }
        Edit::RemoveContainer { container_pick } => {
            if !container_ids.is_empty() {
                let container = container_ids[container_pick % container_ids.len()];
                let _ = rig.handle.graph_mut(0).unwrap().remove_container(container);
            }
        }
    }
}

fn assert_invariants(rig: &mut EngineRig) {
    let graph = rig.handle.graph(0).unwrap();
    let order = graph.order();

    // Chain order == persisted config order, entry for entry.
    let config_order: Vec<u64> = graph
        .config()
        .plugins
        .iter()
        .map(|p| p.instance_id)
        .collect();
    assert_eq!(order, config_order, "config order diverged");

    // Every entry has exactly one config record.
    for id in &order {
        assert_eq!(
            graph
                .config()
                .plugins
                .iter()
                .filter(|p| p.instance_id == *id)
                .count(),
            1
        );
    }

    // Containers: members exist, are unique across containers, and sit in
    // one contiguous ascending run.
    let mut seen = Vec::new();
    for container in graph.containers() {
        let positions: Vec<usize> = container
            .members
            .iter()
            .map(|id| {
                assert!(
                    !seen.contains(id),
                    "instance {id} in two containers"
                );
                seen.push(*id);
                order
                    .iter()
                    .position(|x| x == id)
                    .expect("container member missing from chain")
            })
            .collect();
        for window in positions.windows(2) {
            assert_eq!(window[1], window[0] + 1, "container not contiguous");
        }
    }

    // Config containers mirror the model.
    assert_eq!(graph.config().containers.len(), graph.containers().len());
    for (model, persisted) in graph.containers().iter().zip(&graph.config().containers) {
        assert_eq!(model.id, persisted.id);
        assert_eq!(model.members, persisted.plugin_instance_ids);
        assert_eq!(model.bypassed, persisted.bypassed);
    }

    // The live chain follows the model once commands drain.
    let mut output = vec![0.0_f32; BLOCK * 2];
    rig.audio.render(&mut output);
    assert_eq!(
        rig.audio.chain_order(0).expect("channel 0"),
        order,
        "live chain diverged from the model"
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn edits_preserve_graph_invariants(edits in prop::collection::vec(edit_strategy(), 1..24)) {
        let mut rig = fresh_rig();
        for edit in &edits {
            apply_edit(&mut rig, edit);
            assert_invariants(&mut rig);
        }
        rig.handle.drain_retired();
    }

    #[test]
    fn instance_ids_survive_every_edit(edits in prop::collection::vec(edit_strategy(), 1..24)) {
        let mut rig = fresh_rig();
        // Ids observed alongside their type; once assigned, the pairing
        // never changes while the plugin lives.
        let mut known: Vec<(u64, String)> = Vec::new();
        for edit in &edits {
            apply_edit(&mut rig, edit);
            let graph = rig.handle.graph(0).unwrap();
            for entry in graph.entries() {
                match known.iter().find(|(id, _)| *id == entry.instance_id()) {
                    Some((_, type_id)) => prop_assert_eq!(type_id.as_str(), entry.type_id()),
                    None => known.push((entry.instance_id(), entry.type_id().to_string())),
                }
            }
        }
        // Ids are never reused, so the known list only ever grows.
        let mut ids: Vec<u64> = known.iter().map(|(id, _)| *id).collect();
        ids.dedup();
        prop_assert_eq!(ids.len(), known.len());
    }
}
