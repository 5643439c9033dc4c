use crate::config::ConfigDoc;
use crate::error::Result;
use crate::planner::Plan;

pub mod build;
pub mod core;
pub mod package;
pub mod recipe;
pub mod source;
pub mod util;

pub trait Module {
    fn id(&self) -> &'static str;
    fn plan(&self, doc: &ConfigDoc, plan: &mut Plan) -> Result<()>;
}

/// The recipe lifecycle, in declaration order. Ordering between tasks comes from
/// their `after`/`provides` declarations, not from this list.
pub fn builtin_modules() -> Vec<Box<dyn Module>> {
    vec![
        Box::new(core::CoreModule),
        Box::new(recipe::RecipeModule),
        Box::new(source::SourceModule),
        Box::new(build::BuildModule),
        Box::new(package::PackageModule),
    ]
}

/// Plan every built-in module and close the plan with the source barrier.
pub fn plan_recipe(doc: &ConfigDoc) -> Result<Plan> {
    let mut plan = Plan::default();
    for m in builtin_modules() {
        m.plan(doc, &mut plan)?;
    }
    plan.finalize_default()?;
    Ok(plan)
}
