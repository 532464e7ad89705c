mod record_list;

pub use record_list::RecordListView;
