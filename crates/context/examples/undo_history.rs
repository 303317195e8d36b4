//! Undo history example - transactions, validators, undo and redo

use atf_context::{DanglingPolicy, ReferenceValidator, UniqueIdValidator, ValidatorManager};
use atf_dom::{AttributeInfo, AttributeKind, AttributeRule, ChildInfo, Document, SchemaBuilder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let mut builder = SchemaBuilder::new("timeline");
    let timeline = builder.define_type("timeline")?;
    let track = builder.define_type("track")?;
    let clip = builder.define_type("clip")?;
    builder.add_attribute(track, AttributeInfo::new("name", AttributeKind::String))?;
    builder.set_id_attribute(track, "name")?;
    builder.add_attribute(clip, AttributeInfo::new("name", AttributeKind::String))?;
    builder.add_attribute(
        clip,
        AttributeInfo::new("track", AttributeKind::Reference)
            .with_rule(AttributeRule::NodeType(track)),
    )?;
    builder.add_child(timeline, ChildInfo::list("tracks", track))?;
    builder.add_child(timeline, ChildInfo::list("clips", clip))?;
    let schema = builder.build()?;

    let tracks = schema.child("timeline", "tracks").ok_or("missing slot")?;
    let clips = schema.child("timeline", "clips").ok_or("missing slot")?;
    let track_name = schema.attribute("track", "name").ok_or("missing attribute")?;
    let clip_name = schema.attribute("clip", "name").ok_or("missing attribute")?;
    let clip_track = schema.attribute("clip", "track").ok_or("missing attribute")?;

    let mut doc = Document::new(schema);
    let root = doc.create_node(timeline)?;
    doc.set_root(root)?;

    let mut validators = ValidatorManager::new();
    validators.register(Box::new(ReferenceValidator::with_policy(DanglingPolicy::RemoveOwner)));
    validators.register(Box::new(UniqueIdValidator::new()));
    validators.attach(&mut doc);

    let video = doc.do_transaction("Add Track", |doc| {
        let video = doc.create_node(track)?;
        doc.set_attribute(video, &track_name, "video")?;
        doc.add_child(root, &tracks, video)?;
        Ok(video)
    })?;

    doc.do_transaction("Add Clip", |doc| {
        let intro = doc.create_node(clip)?;
        doc.set_attribute(intro, &clip_name, "intro")?;
        doc.set_attribute(intro, &clip_track, video)?;
        doc.add_child(root, &clips, intro)
    })?;

    doc.do_transaction("Add Duplicate Track", |doc| {
        let again = doc.create_node(track)?;
        doc.set_attribute(again, &track_name, "video")?;
        doc.add_child(root, &tracks, again)
    })?;

    // Removing the track takes the clip that points at it along
    doc.do_transaction("Remove Track", |doc| doc.remove_from_parent(video))?;
    println!(
        "After removal: {} tracks, {} clips",
        doc.child_count(root, &tracks)?,
        doc.child_count(root, &clips)?
    );

    for command in doc.history().commands() {
        println!("  {} ({} operations)", command.name(), command.len());
    }

    while doc.can_undo() {
        println!("Undo {:?}", doc.history().undo_description());
        doc.undo()?;
    }
    while doc.can_redo() {
        println!("Redo {:?}", doc.history().redo_description());
        doc.redo()?;
    }
    println!("Dirty: {}", doc.history().is_dirty());
    Ok(())
}
