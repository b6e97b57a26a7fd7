mod dispatcher;
mod helpers;
mod host;
mod listener;
mod task_table;
