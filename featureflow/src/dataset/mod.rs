//! Record files and batched datasets.

mod assembler;
mod codec;
mod io;

pub use assembler::{build_dataset, build_train_eval, Batch, BatchedDataset, DatasetOptions, DEFAULT_BATCH_SIZE};
pub use codec::{
    columns_to_records, parse_record, records_to_columns, records_to_fitted_columns, scalar_from_json, Record,
    RecordLocation,
};
pub use io::{
    read_records, resolve_file_patterns, write_records, GzipRecordReader, GzipRecordWriter, RECORD_FILE_NAME,
};
