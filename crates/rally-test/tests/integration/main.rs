mod helpers;

mod budget_tabs;
mod join_flow;
mod live_flow;
