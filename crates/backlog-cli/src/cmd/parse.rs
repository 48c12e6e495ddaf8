use crate::context::Context;
use crate::output::{print_json, print_table};
use std::path::Path;

pub fn run(ctx: &Context, file: Option<&Path>) -> anyhow::Result<()> {
    let (path, backlog) = ctx.load_backlog(file)?;
    if ctx.json {
        return print_json(&backlog);
    }

    let (epics, stories, tasks) = backlog.counts();
    println!("{}", path.display());
    println!("Epics: {epics}  Stories: {stories}  Tasks: {tasks}");
    println!();

    let mut rows = Vec::new();
    for epic in &backlog.epics {
        rows.push(vec![
            epic.id.clone(),
            String::new(),
            epic.name.clone(),
            epic.target_sprint.clone().unwrap_or_default(),
            String::new(),
        ]);
        for story in &epic.stories {
            let done = story.tasks.iter().filter(|t| t.done).count();
            rows.push(vec![
                String::new(),
                story.id.clone(),
                story.title.clone(),
                story.sprint.clone().unwrap_or_default(),
                format!("{done}/{}", story.tasks.len()),
            ]);
        }
    }
    print_table(&["EPIC", "STORY", "TITLE", "SPRINT", "TASKS"], rows);
    Ok(())
}
