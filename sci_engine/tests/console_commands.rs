mod common;

use std::collections::BTreeMap;

use anyhow::Result;
use sci_engine::{Console, ConsoleContext, ExecutionState, Reg, SegManager};
use sci_formats::SciVersion;

use common::{config, heap_with, sci0_resource, sci0_script, ObjectSpec};

struct Room {
    heap: SegManager,
    actor: Reg,
    ego: Reg,
    foos: [Reg; 2],
}

fn room() -> Result<Room> {
    let (data, layout) = sci0_script(
        &[],
        &[],
        &[
            ObjectSpec::class(0, "Actor"),
            ObjectSpec::instance(0, "ego").with_extra(&[12, 34]),
            ObjectSpec::instance(0, "foo"),
            ObjectSpec::instance(0, "foo"),
        ],
    );
    let mut heap = heap_with(
        &config(SciVersion::Sci0Late),
        BTreeMap::from([(1, sci0_resource(1, data))]),
    );
    let segment = heap.instantiate_script(1)?;
    let at = |index: usize| Reg::new(segment, layout.objects[index]);
    Ok(Room {
        actor: at(0),
        ego: at(1),
        foos: [at(2), at(3)],
        heap,
    })
}

#[test]
fn duplicate_names_need_an_index() -> Result<()> {
    let room = room()?;
    let ctx = ConsoleContext::new(&room.heap);
    let mut console = Console::new();

    assert_eq!(
        console.execute("addr ?foo.1", &ctx),
        vec![format!("{} -> object foo", room.foos[1])]
    );
    // Offsets inside an object body show the raw script bytes.
    let inside = room.foos[0].with_offset_delta(2);
    let out = console.execute("addr ?foo.0+2", &ctx);
    assert!(out[0].starts_with(&format!("{inside} -> raw ")), "{out:?}");

    let out = console.execute("addr ?foo", &ctx);
    assert_eq!(out.len(), 1);
    assert!(out[0].starts_with("addr: '?foo' is not an address or object"));
    assert!(out[0].contains(&format!("0: [{}], 1: [{}]", room.foos[0], room.foos[1])));

    let out = console.execute("addr ?foo.2", &ctx);
    assert!(out[0].contains("index 0x2 is out of range"), "{out:?}");
    let out = console.execute("vo ?nobody", &ctx);
    assert!(out[0].contains("no object named 'nobody'"), "{out:?}");
    Ok(())
}

#[test]
fn script_relative_addresses() -> Result<()> {
    let room = room()?;
    let ctx = ConsoleContext::new(&room.heap);
    let mut console = Console::new();

    let line = format!("addr &1:{:x}", room.ego.offset);
    assert_eq!(
        console.execute(&line, &ctx),
        vec![format!("{} -> object ego", room.ego)]
    );
    let out = console.execute("addr &7:0", &ctx);
    assert!(out[0].ends_with("script 7 is not loaded"), "{out:?}");
    assert_eq!(console.execute("addr 2a", &ctx), vec!["0000:002a = 42"]);
    Ok(())
}

#[test]
fn view_object_lists_selectors_and_methods() -> Result<()> {
    let room = room()?;
    let ctx = ConsoleContext::new(&room.heap);
    let mut console = Console::new();

    let out = console.execute("vo ?ego", &ctx);
    assert_eq!(out[0], format!("[{}] ego (object)", room.ego));
    assert_eq!(out[1], format!("  species: [{}] Actor", room.actor));
    assert_eq!(out[3], "  -info-: 0000");
    assert_eq!(out[4], "  6 variables:");
    assert_eq!(out[9], "    [004] x = 0000:000c");
    assert_eq!(out[10], "    [005] y = 0000:0022");
    assert_eq!(out[11], "  0 methods:");

    let out = console.execute("vo ?Actor", &ctx);
    assert_eq!(out[0], format!("[{}] Actor (class)", room.actor));
    assert!(out.contains(&format!("    [{}] init", Reg::new(room.actor.segment, 0x40))));
    assert!(out.contains(&format!("    [{}] doit", Reg::new(room.actor.segment, 0x60))));
    Ok(())
}

#[test]
fn register_addresses_follow_the_execution_state() -> Result<()> {
    let room = room()?;
    let state = ExecutionState {
        obj: room.ego,
        acc: room.foos[1],
        ..ExecutionState::default()
    };
    let ctx = ConsoleContext {
        heap: &room.heap,
        state: Some(&state),
        resources: None,
    };
    let mut console = Console::new();
    assert_eq!(
        console.execute("vo $obj", &ctx)[0],
        format!("[{}] ego (object)", room.ego)
    );
    assert_eq!(
        console.execute("addr $A", &ctx),
        vec![format!("{} -> object foo", room.foos[1])]
    );

    let without_state = ConsoleContext::new(&room.heap);
    let out = console.execute("vo $obj", &without_state);
    assert!(out[0].ends_with("registers need a live execution state"), "{out:?}");
    Ok(())
}

#[test]
fn segments_describe_the_heap() -> Result<()> {
    let mut room = room()?;
    room.heap.alloc_string("Sierra")?;
    let ctx = ConsoleContext::new(&room.heap);
    let out = Console::new().execute("segments", &ctx);
    assert_eq!(
        out,
        vec![
            format!("{}: script.001 (4 objects, 0 locals, 1 lockers)", room.ego.segment),
            format!("{}: strings (1 live)", room.heap.segment_ids()[1]),
        ]
    );
    Ok(())
}
