//! 分類パイプラインの状態管理
//!
//! モデル読み込み・画像選択・推論の要求を受け付け、UIシェルに見せる
//! ステータスを一本の状態機械で管理します。
//!
//! - モデルは起動時に一度だけ読み込み、以降のpredictで使い回す
//! - predict要求は直列に実行する。実行中に来た要求は完了を待ってから、
//!   その時点で選択されている画像で実行する
//! - 実行中のpredictが呼び出し側で破棄された場合はPredictionFailedに遷移する

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use burn::tensor::backend::Backend;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, error, info, warn};

use crate::error::{ModelLoadError, PipelineError, PreconditionError};
use crate::ml::{decode, BurnModel, ImagePreprocessor, InferenceEngine, ModelHandle, ModelLoader, RawImage, ScoreModel};
use crate::types::{ControllerSnapshot, PipelineStatus, Prediction, StatusChange};

/// 画像かモデルが未準備のときにユーザーへ出す通知
pub const NOT_READY_NOTICE: &str = "Image or model is not ready";

/// 実行中のpredictが破棄されたときの通知
pub const CANCELLED_NOTICE: &str = "Prediction cancelled";

const EVENT_CAPACITY: usize = 64;

struct ControllerState {
    status: PipelineStatus,
    image: Option<RawImage>,
    prediction: Option<Prediction>,
    notice: Option<String>,
}

pub struct ClassificationController<M: ScoreModel> {
    model: OnceCell<ModelHandle<M>>,
    state: Mutex<ControllerState>,
    // predict要求の直列化用
    pipeline: tokio::sync::Mutex<()>,
    events: broadcast::Sender<StatusChange>,
    preprocessor: ImagePreprocessor,
    engine: InferenceEngine,
}

impl<M: ScoreModel> ClassificationController<M> {
    pub fn new(preprocessor: ImagePreprocessor) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            model: OnceCell::new(),
            state: Mutex::new(ControllerState {
                status: PipelineStatus::Idle,
                image: None,
                prediction: None,
                notice: None,
            }),
            pipeline: tokio::sync::Mutex::new(()),
            events,
            preprocessor,
            engine: InferenceEngine::new(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, state: &mut ControllerState, to: PipelineStatus) {
        let from = state.status;
        state.status = to;
        info!("[State] {:?} -> {:?}", from, to);
        // 購読者がいない場合の送信エラーは無視
        let _ = self.events.send(StatusChange { from, to });
    }

    /// 現在のステータス
    pub fn status(&self) -> PipelineStatus {
        self.lock_state().status
    }

    /// 現在の分類結果
    pub fn prediction(&self) -> Option<Prediction> {
        self.lock_state().prediction
    }

    /// ユーザー向けの通知メッセージ
    pub fn notice(&self) -> Option<String> {
        self.lock_state().notice.clone()
    }

    pub fn is_model_loaded(&self) -> bool {
        self.model.initialized()
    }

    /// UIシェル向けの状態一式
    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.lock_state();
        ControllerSnapshot {
            status: state.status,
            prediction: state.prediction,
            notice: state.notice.clone(),
            has_image: state.image.is_some(),
            image_name: state.image.as_ref().and_then(|image| image.name().map(str::to_string)),
        }
    }

    /// 状態遷移の購読
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.events.subscribe()
    }

    /// モデル読み込みを実行する
    ///
    /// Idle状態でのみ有効。読み込み中・読み込み済み・失敗後の呼び出しは何もしない。
    /// 失敗はプロセス終了まで回復しない（自動再試行なし）。
    pub async fn load_model_with<F>(&self, loading: F) -> Result<(), PipelineError>
    where
        F: Future<Output = Result<ModelHandle<M>, ModelLoadError>>,
    {
        {
            let mut state = self.lock_state();
            if state.status != PipelineStatus::Idle {
                debug!("モデル読み込みは既に実行済みです ({:?})", state.status);
                return Ok(());
            }
            self.transition(&mut state, PipelineStatus::LoadingModel);
        }

        info!("Starting to load model...");
        match loading.await {
            Ok(handle) => {
                info!(source = handle.description(), "Load model success");
                if self.model.set(handle).is_err() {
                    warn!("モデルハンドルは既に設定されています");
                }
                let mut state = self.lock_state();
                self.transition(&mut state, PipelineStatus::Ready);
                Ok(())
            }
            Err(e) => {
                error!("Failed to load model: {}", e);
                let mut state = self.lock_state();
                state.notice = Some(format!("Failed to load model: {}", e));
                self.transition(&mut state, PipelineStatus::ModelLoadFailed);
                Err(e.into())
            }
        }
    }

    /// 画像を選択する
    ///
    /// 以前の画像を置き換えるだけで、ステータスは変えない。
    pub fn select_image(&self, image: RawImage) {
        debug!(name = image.name(), bytes = image.len(), "画像を選択しました");
        self.lock_state().image = Some(image);
    }

    /// 選択中の画像を分類する
    ///
    /// 画像かモデルが未準備なら、ステータスを変えずに即座に拒否する。
    /// 前処理・推論・デコードのいずれかが失敗した場合はPredictionFailedに遷移し、
    /// 以前の分類結果は破棄する。
    pub async fn predict(&self) -> Result<Prediction, PipelineError> {
        {
            let mut state = self.lock_state();
            if let Err(reason) = self.check_ready(&state) {
                warn!("{}", reason);
                state.notice = Some(NOT_READY_NOTICE.to_string());
                return Err(reason.into());
            }
        }

        let _pipeline = self.pipeline.lock().await;

        let (handle, image) = {
            let mut state = self.lock_state();
            let handle = match self.model.get() {
                Some(handle) => handle,
                None => return Err(PreconditionError::ModelNotReady(state.status).into()),
            };
            let image = match state.image.clone() {
                Some(image) => image,
                None => return Err(PreconditionError::NoImage.into()),
            };
            state.notice = None;
            self.transition(&mut state, PipelineStatus::Predicting);
            (handle, image)
        };
        let mut in_flight = InFlight {
            controller: self,
            finished: false,
        };

        let result = self.run_pipeline(handle, &image).await;

        let mut state = self.lock_state();
        in_flight.finished = true;
        match result {
            Ok(prediction) => {
                info!(
                    label = prediction.label.label(),
                    probability = prediction.probability,
                    "分類完了"
                );
                state.prediction = Some(prediction);
                self.transition(&mut state, PipelineStatus::PredictionReady);
                Ok(prediction)
            }
            Err(e) => {
                error!("Prediction failed: {}", e);
                state.prediction = None;
                state.notice = Some(format!("Prediction failed: {}", e));
                self.transition(&mut state, PipelineStatus::PredictionFailed);
                Err(e)
            }
        }
    }

    fn check_ready(&self, state: &ControllerState) -> Result<(), PreconditionError> {
        if !state.status.model_ready() || !self.model.initialized() {
            return Err(PreconditionError::ModelNotReady(state.status));
        }
        if state.image.is_none() {
            return Err(PreconditionError::NoImage);
        }
        Ok(())
    }

    async fn run_pipeline(&self, handle: &ModelHandle<M>, image: &RawImage) -> Result<Prediction, PipelineError> {
        let tensor = self.preprocessor.prepare(image).await?;
        let scores = self.engine.infer(handle, tensor).await?;
        debug!(scores = ?scores.as_array(), "推論スコア");
        Ok(decode(&scores))
    }
}

/// 実行中のpredict
///
/// 呼び出し側がFutureを破棄した場合（タイムアウトなど）、Predictingのまま
/// 残さずにPredictionFailedへ遷移させる。
struct InFlight<'a, M: ScoreModel> {
    controller: &'a ClassificationController<M>,
    finished: bool,
}

impl<M: ScoreModel> Drop for InFlight<'_, M> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let controller = self.controller;
        let mut state = controller.lock_state();
        warn!("Prediction cancelled before completion");
        state.prediction = None;
        state.notice = Some(CANCELLED_NOTICE.to_string());
        controller.transition(&mut state, PipelineStatus::PredictionFailed);
    }
}

impl<B: Backend> ClassificationController<BurnModel<B>> {
    /// 起動時のモデル読み込み
    pub async fn start(&self, loader: &ModelLoader<B>) -> Result<(), PipelineError> {
        self.load_model_with(loader.load()).await
    }
}
